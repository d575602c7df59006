//! Doctor command - verify credentials and configuration.

use crate::cli::preflight::check_tool;
use crate::cli::Output;
use crate::config::{PollSettings, Settings};
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

fn print_section(title: &str, checks: &[CheckResult]) {
    println!("{}", style(title).bold());
    for check in checks {
        check.print();
    }
    println!();
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Vente Doctor");
    println!();
    println!("Checking credentials and configuration...\n");

    let credentials = vec![
        check_secret(
            "Replicate token",
            settings.replicate.resolved_token(),
            "Needed for video generation with --provider replicate. Set REPLICATE_API_TOKEN.",
        ),
        check_secret(
            "Google API key",
            settings.veo.resolved_key(),
            "Needed for video generation with --provider veo. Set GOOGLE_API_KEY.",
        ),
        check_secret(
            "Google Maps API key",
            settings.places.resolved_key(),
            "Needed for place suggestions. Set GOOGLE_MAPS_API_KEY.",
        ),
        check_secret(
            "Asset proxy GUID",
            settings.asset_proxy.resolved_guid(),
            "Needed to publish generated images and music. Set ASSET_PROXY_AUTH_GUID.",
        ),
    ];
    print_section("API Credentials", &credentials);

    let vertex = check_vertex(settings);
    print_section("Vertex AI", &vertex);

    let config = vec![check_config_file(), check_config_values(settings)];
    print_section("Configuration", &config);

    let checks: Vec<&CheckResult> = credentials
        .iter()
        .chain(vertex.iter())
        .chain(config.iter())
        .collect();
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Vente.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!(
            "All checks passed with {} warning(s). Tools without credentials are unavailable.",
            warnings
        ));
    } else {
        Output::success("All checks passed! Every tool is ready to use.");
    }

    Ok(())
}

/// Show a masked secret, or a warning with a hint.
fn check_secret(name: &str, value: Option<String>, hint: &str) -> CheckResult {
    match value {
        Some(secret) => CheckResult::ok(name, &format!("configured ({})", mask(&secret))),
        None => CheckResult::warning(name, "not set", hint),
    }
}

fn check_vertex(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    match settings.vertex.resolved_project() {
        Some(project) => results.push(CheckResult::ok(
            "Project",
            &format!("{} ({})", project, settings.vertex.location),
        )),
        None => results.push(CheckResult::warning(
            "Project",
            "not set",
            "Set vertex.project_id or GOOGLE_CLOUD_PROJECT to enable image and music tools.",
        )),
    }

    if let Some(token) = settings.vertex.resolved_token() {
        results.push(CheckResult::ok(
            "Access token",
            &format!("static ({})", mask(&token)),
        ));
    } else {
        match check_tool("gcloud") {
            Ok(()) => results.push(CheckResult::ok("Access token", "from gcloud CLI")),
            Err(e) if settings.vertex.resolved_project().is_some() => results.push(
                CheckResult::error(
                    "Access token",
                    &e.to_string(),
                    "Install the Google Cloud CLI or set VERTEX_ACCESS_TOKEN.",
                ),
            ),
            Err(_) => results.push(CheckResult::warning(
                "Access token",
                "no static token and gcloud not found",
                "Install the Google Cloud CLI or set VERTEX_ACCESS_TOKEN.",
            )),
        }
    }

    results
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: vente config edit",
        )
    }
}

fn check_config_values(settings: &Settings) -> CheckResult {
    match settings.validate() {
        Ok(()) => CheckResult::ok(
            "Flights",
            &format!(
                "{} ({}, {}), polling {}",
                settings.flights.base_url,
                settings.flights.market,
                settings.flights.currency,
                describe_poll(&settings.flights.poll)
            ),
        ),
        Err(e) => CheckResult::error("Settings", &e.to_string(), "Fix with: vente config edit"),
    }
}

fn describe_poll(poll: &PollSettings) -> String {
    format!("{} x {}s", poll.max_attempts, poll.delay_seconds)
}

/// Keep the first and last four characters of long secrets.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
