use std::path::PathBuf;

use clap::Parser;
use cogquery_cli::{AppConfig, Cli, Command, Preference};

#[test]
fn parse_ingest_with_sizes() {
    let cli = Cli::try_parse_from([
        "cogquery",
        "--index-dir",
        "/tmp/idx",
        "ingest",
        "a.txt",
        "docs",
        "--fragment-size",
        "400",
        "--fragment-overlap",
        "40",
    ])
    .unwrap();

    assert_eq!(cli.index_dir, Some(PathBuf::from("/tmp/idx")));
    match &cli.command {
        Command::Ingest { paths, fragment_size, fragment_overlap } => {
            assert_eq!(paths, &vec![PathBuf::from("a.txt"), PathBuf::from("docs")]);
            assert_eq!(*fragment_size, Some(400));
            assert_eq!(*fragment_overlap, Some(40));
        }
        other => panic!("wrong command: {other:?}"),
    }

    let mut config = AppConfig::default();
    cli.apply_flags(&mut config);
    assert_eq!(config.index_dir, PathBuf::from("/tmp/idx"));
    assert_eq!(config.retriever.fragment_size, 400);
    assert_eq!(config.retriever.fragment_overlap, 40);
}

#[test]
fn ingest_requires_a_path() {
    assert!(Cli::try_parse_from(["cogquery", "ingest"]).is_err());
}

#[test]
fn parse_query_flags() {
    let cli =
        Cli::try_parse_from(["cogquery", "query", "sky color", "--top-k", "4", "--explain", "-v"])
            .unwrap();
    assert!(cli.verbose);
    match &cli.command {
        Command::Query { text, top_k, explain } => {
            assert_eq!(text, "sky color");
            assert_eq!(*top_k, Some(4));
            assert!(*explain);
        }
        other => panic!("wrong command: {other:?}"),
    }

    let mut config = AppConfig::default();
    cli.apply_flags(&mut config);
    assert_eq!(config.retriever.top_k_fragments, 4);
}

#[test]
fn parse_plan_summary_preference() {
    let cli = Cli::try_parse_from(["cogquery", "plan-summary", "topic", "--prefer", "map-reduce"])
        .unwrap();
    match cli.command {
        Command::PlanSummary { text, context_limit, prefer, top_k } => {
            assert_eq!(text, "topic");
            assert_eq!(context_limit, 8000);
            assert_eq!(prefer, Some(Preference::MapReduce));
            assert_eq!(top_k, None);
        }
        other => panic!("wrong command: {other:?}"),
    }

    assert!(Cli::try_parse_from(["cogquery", "plan-summary", "t", "--prefer", "bogus"]).is_err());
}

#[test]
fn global_flags_follow_the_subcommand() {
    let cli = Cli::try_parse_from(["cogquery", "stats", "--config", "cfg.json"]).unwrap();
    assert!(matches!(cli.command, Command::Stats));
    assert_eq!(cli.config, Some(PathBuf::from("cfg.json")));
}
