use voice_domain::config::{Config, ConfigSeverity};

/// Run diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("voice-gateway doctor");
    println!("=====================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_backend_reachable("STT", &config.stt.base_url, &mut all_passed).await;
    check_backend_reachable("LLM", &config.llm.base_url, &mut all_passed).await;
    check_backend_reachable("TTS", &config.tts.base_url, &mut all_passed).await;

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({error_count} error(s))", issues.len()),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_backend_reachable(label: &str, base_url: &str, all_passed: &mut bool) {
    let reachable = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()
    {
        Ok(client) => client.get(base_url).send().await.is_ok(),
        Err(_) => false,
    };

    print_check(
        &format!("{label} backend reachable"),
        reachable,
        if reachable {
            base_url.to_owned()
        } else {
            format!("{base_url} (unreachable)")
        },
    );

    // Non-fatal: a dev box may run without every backend wired up yet.
    if !reachable {
        let _ = all_passed;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
