//! # helm-config
//!
//! TOML configuration for the helm runtime.
//!
//! ```toml
//! [controller]
//! max_iterations = 10
//! confirmation_mode = false
//!
//! [condenser]
//! type = "summary"
//! max_messages = 20
//!
//! [context.type_priority]
//! user_info = 0.95
//!
//! [[agents]]
//! id = "operator"
//! name = "Operator"
//! role = "assistant"
//! tool_permissions = ["think", "run_command"]
//! ```
//!
//! ```rust,ignore
//! let config = HelmConfig::from_file(Path::new("helm.toml"))?;
//! ```

pub mod config;

pub use config::{AgentProfile, HelmConfig};

#[cfg(test)]
mod tests {
    use std::io::Write;

    use helm_contracts::{agent::AgentRole, error::HelmError};
    use helm_memory::CondenserConfig;

    use super::*;

    fn config_error(toml: &str) -> String {
        match HelmConfig::from_toml_str(toml) {
            Err(HelmError::Config { reason }) => reason,
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_document_uses_defaults() {
        let config = HelmConfig::from_toml_str("").unwrap();
        assert_eq!(config, HelmConfig::default());
        assert_eq!(config.controller.max_iterations, 10);
        assert_eq!(config.memory.max_messages, 100);
        assert_eq!(config.condenser, CondenserConfig::Noop);
        assert_eq!(config.context.retention_days, 30);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn full_document_parses() {
        let toml = r#"
            [controller]
            max_iterations = 3
            max_budget = 1.5
            confirmation_mode = true

            [memory]
            max_messages = 40

            [condenser]
            type = "summary"
            max_messages = 8
            keep_system_message = false

            [context]
            default_ttl_secs = 600
            [context.type_priority]
            user_info = 0.95
            [context.type_importance]
            metadata = 0.5

            [[agents]]
            id = "operator"
            name = "Operator"
            tool_permissions = ["think", "run_command"]

            [[agents]]
            id = "auditor"
            name = "Auditor"
            role = "admin"
            session_id = "audit"
        "#;
        let config = HelmConfig::from_toml_str(toml).unwrap();

        assert_eq!(config.controller.max_iterations, 3);
        assert_eq!(config.controller.max_budget, Some(1.5));
        assert!(config.controller.confirmation_mode);
        assert_eq!(config.memory.max_messages, 40);
        match &config.condenser {
            CondenserConfig::Summary(c) => {
                assert_eq!(c.max_messages, 8);
                assert!(!c.keep_system_message);
                assert!(c.keep_last_user_message);
            }
            other => panic!("expected Summary, got {:?}", other),
        }
        assert_eq!(config.context.default_ttl_secs, 600);
        assert_eq!(config.context.type_priority["user_info"], 0.95);

        let operator = config.agent("operator").unwrap();
        assert_eq!(operator.role, AgentRole::Assistant);
        assert_eq!(operator.tool_permissions, vec!["think", "run_command"]);
        assert_eq!(config.agent("auditor").unwrap().session_id.as_deref(), Some("audit"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(config_error("[controller\nmax_iterations = 1").contains("parse"));
        assert!(config_error("[controller]\nmax_iterations = \"ten\"").contains("parse"));
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn rejects_zero_iterations_and_negative_budget() {
        assert!(config_error("[controller]\nmax_iterations = 0").contains("max_iterations"));
        assert!(config_error("[controller]\nmax_budget = -1.0").contains("max_budget"));
    }

    #[test]
    fn rejects_tiny_summary_condenser() {
        let reason = config_error("[condenser]\ntype = \"summary\"\nmax_messages = 1");
        assert!(reason.contains("max_messages"));
    }

    #[test]
    fn rejects_bad_context_settings() {
        assert!(config_error("[context]\nchars_per_token = 0").contains("chars_per_token"));
        assert!(config_error("[context.type_priority]\ntask = -0.1").contains("task"));
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let toml = r#"
            [[agents]]
            id = "a"
            name = "First"
            [[agents]]
            id = "a"
            name = "Second"
        "#;
        assert!(config_error(toml).contains("'a'"));
    }

    // ── Files ─────────────────────────────────────────────────────────────────

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller]\nmax_iterations = 4").unwrap();
        let config = HelmConfig::from_file(file.path()).unwrap();
        assert_eq!(config.controller.max_iterations, 4);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = HelmConfig::from_file(std::path::Path::new("/no/such/helm.toml")).unwrap_err();
        assert!(matches!(err, HelmError::Config { .. }));
        assert!(err.to_string().contains("helm.toml"));
    }
}
