use anyhow::Result;
use clap::Parser;
use ssl_checker::cli::{Cli, Commands, OutputFormat};
use std::path::PathBuf;

#[test]
fn test_cli_defaults() -> Result<()> {
    let cli = Cli::try_parse_from(["ssl-checker"])?;

    assert!(cli.command.is_none());
    assert!(cli.config.is_none());
    assert!(cli.environments.is_empty());
    assert!(!cli.silent);
    assert!(!cli.debug);
    assert!(cli.timeout.is_none());
    assert_eq!(cli.output, OutputFormat::Table);
    assert_eq!(cli.log_file, PathBuf::from("./ssl-checker.log"));

    Ok(())
}

#[test]
fn test_cli_short_flags() -> Result<()> {
    let cli = Cli::try_parse_from([
        "ssl-checker",
        "-c",
        "/tmp/config.yaml",
        "-e",
        "prod,staging",
        "-s",
        "-d",
        "-t",
        "3",
    ])?;

    assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.yaml")));
    assert_eq!(cli.environments, vec!["prod", "staging"]);
    assert!(cli.silent);
    assert!(cli.debug);
    assert_eq!(cli.timeout, Some(3));

    Ok(())
}

#[test]
fn test_cli_rejects_out_of_range_timeout() {
    assert!(Cli::try_parse_from(["ssl-checker", "-t", "70000"]).is_err());
    assert!(Cli::try_parse_from(["ssl-checker", "-t", "-1"]).is_err());
}

#[test]
fn test_cli_direct_targets() -> Result<()> {
    let cli = Cli::try_parse_from([
        "ssl-checker",
        "--file-target",
        "prod=hosts.txt",
        "--domain-target",
        "staging=a.example.com, b.example.com:8443",
        "--domain-target",
        "qa=c.example.com",
    ])?;

    assert_eq!(
        cli.file_targets,
        vec![("prod".to_string(), PathBuf::from("hosts.txt"))]
    );
    assert_eq!(cli.domain_targets.len(), 2);
    assert_eq!(cli.domain_targets[0].0, "staging");
    assert_eq!(
        cli.domain_targets[0].1,
        vec!["a.example.com", "b.example.com:8443"]
    );

    Ok(())
}

#[test]
fn test_cli_rejects_malformed_direct_targets() {
    assert!(Cli::try_parse_from(["ssl-checker", "--file-target", "hosts.txt"]).is_err());
    assert!(Cli::try_parse_from(["ssl-checker", "--domain-target", "=a.example.com"]).is_err());
    assert!(Cli::try_parse_from(["ssl-checker", "--domain-target", "prod="]).is_err());
}

#[test]
fn test_cli_version_subcommand_and_json_output() -> Result<()> {
    let cli = Cli::try_parse_from(["ssl-checker", "version"])?;
    assert_eq!(cli.command, Some(Commands::Version));

    let cli = Cli::try_parse_from(["ssl-checker", "--output", "json", "--warning-days", "7"])?;
    assert_eq!(cli.output, OutputFormat::Json);
    assert_eq!(cli.warning_days, Some(7));

    Ok(())
}
