use super::Config;

pub fn warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.server.port < 1024 {
        warnings.push(format!(
            "[!] Port {} requires root privileges. Consider using a port >= 1024",
            config.server.port
        ));
    }

    if config.apps.is_empty() {
        warnings.push("[!] No apps configured. Every request will be answered with 404.".to_string());
    }

    if config.lifecycle.drain_timeout_secs == 0 {
        warnings.push(
            "[!] drain_timeout_secs is 0. Superseded configurations are deactivated without waiting for in-flight requests.".to_string()
        );
    }

    if !config.admin.enable {
        warnings.push(
            "[i] Admin socket disabled. `fe-host reload` and `fe-host stop` cannot reach this process; send SIGUSR1 or SIGTERM instead.".to_string()
        );
    } else if let Some(parent) = config.admin.unix_socket.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            warnings.push(format!(
                "[!] Admin socket directory does not exist: {}",
                parent.display()
            ));
        }
    }

    if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
        warnings.push(format!(
            "[X] Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
            config.logging.level
        ));
    }

    if !["json", "pretty", "compact"].contains(&config.logging.format.as_str()) {
        warnings.push(format!(
            "[X] Invalid log format: {}. Must be 'json', 'pretty' or 'compact'",
            config.logging.format
        ));
    }

    if config.logging.level == "debug" || config.logging.level == "trace" {
        warnings.push(
            "[*] Recommendation: Use 'info' or 'warn' log level in production".to_string()
        );
    }

    warnings
}
