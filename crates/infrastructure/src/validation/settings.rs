//! Safety validation for orchestrator configuration
//!
//! Flags settings that would let an experiment hurt more than intended or
//! leave a failure behind after a crash. Critical findings block startup in
//! production.

use std::fmt;

use crate::config::{AppConfig, Environment, NotifierKind};

/// Severity level for configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningSeverity {
    Info,
    Warning,
    /// Must be fixed before running in production
    Critical,
}

impl fmt::Display for WarningSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A configuration finding with severity and remedy
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub severity: WarningSeverity,
    /// Short stable code, e.g. `CFG001`
    pub code: String,
    pub message: String,
    pub recommendation: String,
}

impl ConfigWarning {
    #[must_use]
    pub fn new(
        severity: WarningSeverity,
        code: impl Into<String>,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            recommendation: recommendation.into(),
        }
    }

    #[must_use]
    pub fn critical(
        code: impl Into<String>,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self::new(WarningSeverity::Critical, code, message, recommendation)
    }

    #[must_use]
    pub fn warning(
        code: impl Into<String>,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self::new(WarningSeverity::Warning, code, message, recommendation)
    }

    #[must_use]
    pub fn info(
        code: impl Into<String>,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self::new(WarningSeverity::Info, code, message, recommendation)
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self.severity, WarningSeverity::Critical)
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} - {}",
            self.severity, self.code, self.message, self.recommendation
        )
    }
}

/// Validates application configuration for unsafe settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// All findings, critical first
    #[must_use]
    pub fn validate(config: &AppConfig) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let is_production = config.environment == Environment::Production;

        Self::check_blast_radius(config, is_production, &mut warnings);
        Self::check_timing(config, &mut warnings);
        Self::check_ledger_durability(config, is_production, &mut warnings);
        Self::check_notifier(config, is_production, &mut warnings);
        Self::check_platform(config, is_production, &mut warnings);

        warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
        warnings
    }

    /// Whether startup must be refused
    ///
    /// Only production refuses; development logs and continues.
    #[must_use]
    pub fn should_block_startup(config: &AppConfig, warnings: &[ConfigWarning]) -> bool {
        config.environment == Environment::Production
            && warnings.iter().any(ConfigWarning::is_critical)
    }

    pub fn log_warnings(warnings: &[ConfigWarning]) {
        for warning in warnings {
            match warning.severity {
                WarningSeverity::Critical => {
                    tracing::error!(
                        code = %warning.code,
                        message = %warning.message,
                        recommendation = %warning.recommendation,
                        "Unsafe configuration"
                    );
                },
                WarningSeverity::Warning => {
                    tracing::warn!(
                        code = %warning.code,
                        message = %warning.message,
                        recommendation = %warning.recommendation,
                        "Configuration warning"
                    );
                },
                WarningSeverity::Info => {
                    tracing::info!(
                        code = %warning.code,
                        message = %warning.message,
                        recommendation = %warning.recommendation,
                        "Configuration notice"
                    );
                },
            }
        }
    }

    fn check_blast_radius(config: &AppConfig, is_production: bool, warnings: &mut Vec<ConfigWarning>) {
        let ceiling = config.orchestrator.max_blast_radius;
        if ceiling >= 0.5 {
            let severity = if is_production {
                WarningSeverity::Critical
            } else {
                WarningSeverity::Warning
            };
            warnings.push(ConfigWarning::new(
                severity,
                "CFG001",
                format!("Blast radius ceiling {ceiling} allows half or more of a pool to fail at once"),
                "Keep orchestrator.max_blast_radius well below 0.5",
            ));
        } else if ceiling > domain::DEFAULT_MAX_BLAST_RADIUS {
            warnings.push(ConfigWarning::info(
                "CFG002",
                format!("Blast radius ceiling raised to {ceiling}"),
                "Confirm the wider ceiling is intended",
            ));
        }
    }

    fn check_timing(config: &AppConfig, warnings: &mut Vec<ConfigWarning>) {
        let orchestrator = &config.orchestrator;
        if orchestrator.recovery_timeout_secs < orchestrator.poll_interval_secs {
            warnings.push(ConfigWarning::warning(
                "CFG003",
                "Recovery timeout is shorter than the polling interval",
                "Raise recovery_timeout_secs so at least one health poll fits",
            ));
        }
        if orchestrator.call_timeout_secs >= orchestrator.poll_interval_secs {
            warnings.push(ConfigWarning::warning(
                "CFG004",
                "A single metrics read may take longer than the polling interval",
                "Keep call_timeout_secs below poll_interval_secs so guardrails stay timely",
            ));
        }
    }

    fn check_ledger_durability(config: &AppConfig, is_production: bool, warnings: &mut Vec<ConfigWarning>) {
        if config.database.is_in_memory() {
            let severity = if is_production {
                WarningSeverity::Critical
            } else {
                WarningSeverity::Info
            };
            warnings.push(ConfigWarning::new(
                severity,
                "CFG005",
                "Execution ledger is in memory; applied failures cannot be removed after a crash",
                "Point database.path at a file",
            ));
        }
        if !config.orchestrator.recover_orphans_on_startup {
            warnings.push(ConfigWarning::warning(
                "CFG006",
                "Orphan recovery is disabled",
                "Failures left by a crashed process stay active until removed by hand",
            ));
        }
    }

    fn check_notifier(config: &AppConfig, is_production: bool, warnings: &mut Vec<ConfigWarning>) {
        let notifier = &config.notifier;
        match (notifier.kind, notifier.webhook_url.as_deref()) {
            (NotifierKind::Webhook, None | Some("")) => {
                warnings.push(ConfigWarning::critical(
                    "CFG007",
                    "Webhook notifier selected without a webhook_url",
                    "Set notifier.webhook_url or use kind = \"log\"",
                ));
            },
            (NotifierKind::Webhook, Some(url)) if url.starts_with("http://") => {
                warnings.push(ConfigWarning::warning(
                    "CFG008",
                    "Webhook notifications are sent unencrypted",
                    "Use an https:// webhook URL",
                ));
            },
            (NotifierKind::Log, _) if is_production => {
                warnings.push(ConfigWarning::warning(
                    "CFG009",
                    "Critical removal failures are only logged",
                    "Configure a webhook so operators are paged",
                ));
            },
            _ => {},
        }
    }

    fn check_platform(config: &AppConfig, is_production: bool, warnings: &mut Vec<ConfigWarning>) {
        if is_production && config.platform.api_token.as_deref().is_none_or(str::is_empty) {
            warnings.push(ConfigWarning::warning(
                "CFG010",
                "No platform API token configured",
                "Set CHAOS_PLATFORM__API_TOKEN",
            ));
        }
    }
}
