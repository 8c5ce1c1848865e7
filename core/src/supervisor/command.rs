//! Child command line construction

use crate::config::SupervisorConfig;
use std::path::Path;

/// Build the argument vector a script is launched with:
///
/// ```text
/// <runner...> <script> --server-url <url> [--token <token>] [--task <task>]
/// ```
///
/// `server_url` wins when given and non-blank, otherwise the configured
/// farm server is used.
pub fn build_command(
    config: &SupervisorConfig,
    script: &Path,
    server_url: Option<&str>,
    task: &str,
) -> Vec<String> {
    let url = server_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| config.default_server_url());

    let mut command = config.runner.clone();
    command.push(script.to_string_lossy().into_owned());
    command.push("--server-url".to_string());
    command.push(url);

    if let Some(token) = config.api_token.as_deref().filter(|t| !t.is_empty()) {
        command.push("--token".to_string());
        command.push(token.to_string());
    }
    if !task.is_empty() {
        command.push("--task".to_string());
        command.push(task.to_string());
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            server_host: "localhost".to_string(),
            server_port: 5000,
            runner: vec!["python3".to_string(), "start_sploit.py".to_string()],
            ..SupervisorConfig::default()
        }
    }

    #[test]
    fn test_defaults_to_configured_server() {
        let cmd = build_command(&config(), Path::new("scripts/probe.sh"), None, "");
        assert_eq!(
            cmd,
            vec![
                "python3",
                "start_sploit.py",
                "scripts/probe.sh",
                "--server-url",
                "http://localhost:5000",
            ]
        );
    }

    #[test]
    fn test_caller_url_token_and_task() {
        let mut cfg = config();
        cfg.api_token = Some("tok".to_string());
        let cmd = build_command(
            &cfg,
            Path::new("s/a.py"),
            Some("http://10.0.0.1:8080"),
            "web",
        );
        assert_eq!(
            &cmd[2..],
            &["s/a.py", "--server-url", "http://10.0.0.1:8080", "--token", "tok", "--task", "web"]
        );
    }

    #[test]
    fn test_blank_url_falls_back_and_empty_token_is_skipped() {
        let mut cfg = config();
        cfg.api_token = Some(String::new());
        cfg.runner.clear();
        let cmd = build_command(&cfg, Path::new("a.py"), Some("  "), "");
        assert_eq!(cmd, vec!["a.py", "--server-url", "http://localhost:5000"]);
    }
}
