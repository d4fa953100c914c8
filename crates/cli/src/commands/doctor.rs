use agentmart_core::config::{AppConfig, LlmProvider, LoadOptions};
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credential(&config));
            checks.push(check_geocoding_credential(&config));
            checks.push(check_personal_data(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("llm_credential"));
            checks.push(DoctorCheck::skipped("geocoding_credential"));
            checks.push(DoctorCheck::skipped("personal_data_directory"));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credential(config: &AppConfig) -> DoctorCheck {
    let name = "llm_credential";
    match (config.llm.provider, config.llm.has_credential()) {
        (LlmProvider::Ollama, _) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("ollama needs no credential; endpoint `{}`", config.llm.endpoint()),
        },
        (LlmProvider::OpenAi, true) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("api key present for model `{}`", config.llm.model),
        },
        (LlmProvider::OpenAi, false) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: "set OPENAI_API_KEY or AGENTMART_LLM_API_KEY".to_string(),
        },
    }
}

fn check_geocoding_credential(config: &AppConfig) -> DoctorCheck {
    let name = "geocoding_credential";
    if config.geocoding.api_key.is_some() {
        DoctorCheck { name, status: CheckStatus::Pass, details: "api key present".to_string() }
    } else {
        DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: "set GOOGLE_API_KEY or AGENTMART_GEOCODING_API_KEY".to_string(),
        }
    }
}

fn check_personal_data(config: &AppConfig) -> DoctorCheck {
    let name = "personal_data_directory";
    match &config.conversation.personal_data_dir {
        None => DoctorCheck {
            name,
            status: CheckStatus::Skipped,
            details: "not configured; personal agents start with an empty profile".to_string(),
        },
        Some(path) if path.is_dir() => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("reading owner data from `{}`", path.display()),
        },
        Some(path) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("`{}` is not a directory", path.display()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
