use issuepilot_config::McpServerConfig;

/// Token env var used when the provider runs as a direct child process.
pub const DIRECT_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Token env var the containerized GitHub MCP server expects.
pub const CONTAINER_TOKEN_VAR: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Fully resolved command line and environment for the tool-provider process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchPlan {
    /// Build the launch plan, injecting the access token where the provider
    /// can actually see it.
    ///
    /// Direct execution (npx, a binary): the token goes into the child's
    /// environment. Container execution (command contains "docker"): the
    /// child's environment stops at the container boundary, so the token is
    /// injected as an explicit `-e NAME=value` pair instead. The pair is
    /// inserted immediately before the last non-flag argument, which is
    /// assumed to be the image name; when that heuristic can't confidently
    /// place it, the pair is appended and a warning is logged.
    pub fn build(config: &McpServerConfig, token: Option<&str>) -> Self {
        let mut args = config.args.clone();
        let mut env = Vec::new();

        match token {
            Some(token) if !token.trim().is_empty() => {
                if is_container_command(&config.command) {
                    inject_container_token(&mut args, token);
                } else {
                    tracing::info!(
                        var = DIRECT_TOKEN_VAR,
                        "passing access token to tool provider via environment"
                    );
                    env.push((DIRECT_TOKEN_VAR.to_string(), token.to_string()));
                }
            }
            _ => {
                tracing::warn!(
                    command = %config.command,
                    "no GitHub token configured; tool provider may fail to authenticate"
                );
            }
        }

        Self {
            command: config.command.clone(),
            args,
            env,
        }
    }
}

fn is_container_command(command: &str) -> bool {
    command.to_ascii_lowercase().contains("docker")
}

/// Insert `-e NAME=token` before the presumed image argument.
fn inject_container_token(args: &mut Vec<String>, token: &str) {
    let pair = format!("{}={}", CONTAINER_TOKEN_VAR, token);

    let image_idx = args.iter().rposition(|arg| !arg.starts_with('-'));
    match image_idx {
        // Confident only when the last non-flag argument is the final one.
        Some(idx) if idx == args.len() - 1 => {
            tracing::info!(
                var = CONTAINER_TOKEN_VAR,
                position = idx,
                "injecting container token via -e before image argument"
            );
            args.insert(idx, pair);
            args.insert(idx, "-e".to_string());
        }
        _ => {
            tracing::warn!(
                args = ?args,
                var = CONTAINER_TOKEN_VAR,
                "could not locate image argument; appending -e pair at the end"
            );
            args.push("-e".to_string());
            args.push(pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str, args: &[&str]) -> McpServerConfig {
        McpServerConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_ms: 30_000,
        }
    }

    #[test]
    fn direct_mode_sets_env_var() {
        let plan = LaunchPlan::build(
            &config("npx", &["-y", "@modelcontextprotocol/server-github"]),
            Some("ghp_abc"),
        );
        assert_eq!(
            plan.env,
            vec![(DIRECT_TOKEN_VAR.to_string(), "ghp_abc".to_string())]
        );
        assert_eq!(plan.args, vec!["-y", "@modelcontextprotocol/server-github"]);
    }

    #[test]
    fn container_mode_inserts_before_image() {
        let plan = LaunchPlan::build(
            &config(
                "docker",
                &["run", "-i", "--rm", "ghcr.io/github/github-mcp-server"],
            ),
            Some("ghp_abc"),
        );
        assert_eq!(
            plan.args,
            vec![
                "run",
                "-i",
                "--rm",
                "-e",
                "GITHUB_PERSONAL_ACCESS_TOKEN=ghp_abc",
                "ghcr.io/github/github-mcp-server",
            ]
        );
        assert!(plan.env.is_empty());
    }

    #[test]
    fn container_mode_detection_is_case_insensitive() {
        let plan = LaunchPlan::build(&config("/usr/bin/Docker", &["run", "image"]), Some("t"));
        assert!(plan.env.is_empty());
        assert!(plan.args.contains(&"-e".to_string()));
    }

    #[test]
    fn heuristic_falls_back_to_append_when_image_not_last() {
        // Trailing flag after the image candidate: not confident, append.
        let plan = LaunchPlan::build(&config("docker", &["run", "image", "--detach"]), Some("t"));
        assert_eq!(
            plan.args,
            vec![
                "run",
                "image",
                "--detach",
                "-e",
                "GITHUB_PERSONAL_ACCESS_TOKEN=t",
            ]
        );
    }

    #[test]
    fn heuristic_falls_back_when_all_args_are_flags() {
        let plan = LaunchPlan::build(&config("docker", &["--rm", "-i"]), Some("t"));
        assert_eq!(
            plan.args,
            vec!["--rm", "-i", "-e", "GITHUB_PERSONAL_ACCESS_TOKEN=t"]
        );
    }

    #[test]
    fn missing_token_leaves_args_untouched() {
        let plan = LaunchPlan::build(&config("docker", &["run", "image"]), None);
        assert_eq!(plan.args, vec!["run", "image"]);
        assert!(plan.env.is_empty());

        let plan = LaunchPlan::build(&config("npx", &["server"]), Some("   "));
        assert!(plan.env.is_empty());
    }
}
