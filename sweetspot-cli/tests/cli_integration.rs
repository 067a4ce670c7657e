use clap::Parser;
use std::path::PathBuf;

use sweetspot_cli::cli::{AudioArg, MethodArg, ModeArg, StrategyArg};
use sweetspot_cli::{Cli, Commands, load_config};

#[test]
fn test_analyze_defaults() {
    let cli = Cli::try_parse_from(["sweetspot", "analyze", "movie.mkv"]).unwrap();
    assert!(!cli.verbose);
    let Commands::Analyze(args) = cli.command else {
        panic!("expected analyze");
    };
    assert_eq!(args.input, PathBuf::from("movie.mkv"));
    assert_eq!(args.window.duration, 10.0);
    assert_eq!(args.window.mode, ModeArg::MostComplex);
    assert_eq!(args.window.method, MethodArg::Sliding);
    assert_eq!(args.window.strategy, StrategyArg::Parallel);
    assert!(args.extract_to.is_none());
}

#[test]
fn test_analyze_options() {
    let cli = Cli::try_parse_from([
        "sweetspot",
        "analyze",
        "movie.mkv",
        "--sample-duration",
        "20",
        "--mode",
        "least-complex",
        "--method",
        "single-point",
        "--strategy",
        "sequential",
        "--ffprobe",
        "/opt/ffprobe",
        "--json",
        "-v",
    ])
    .unwrap();
    assert!(cli.verbose);
    let Commands::Analyze(args) = cli.command else {
        panic!("expected analyze");
    };
    assert_eq!(args.window.duration, 20.0);
    assert_eq!(args.window.mode, ModeArg::LeastComplex);
    assert_eq!(args.window.method, MethodArg::SinglePoint);
    assert_eq!(args.window.strategy, StrategyArg::Sequential);
    assert_eq!(args.window.ffprobe, PathBuf::from("/opt/ffprobe"));
    assert!(args.json);
}

#[test]
fn test_optimize_arguments() {
    let cli = Cli::try_parse_from([
        "sweetspot",
        "--config",
        "tuning.json",
        "optimize",
        "movie.mkv",
        "--codec",
        "libx265",
        "--presets",
        "fast,slow",
        "--quality-min",
        "18",
        "--quality-max",
        "30",
        "--step",
        "2",
        "--service",
        "./trial-service",
        "--service-arg",
        "--fast-metrics",
        "-o",
        "tune=grain",
        "--option",
        "x265-params=aq-mode=3",
        "--audio",
        "copy",
        "--psnr",
        "-j",
        "4",
    ])
    .unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("tuning.json")));
    let Commands::Optimize(args) = cli.command else {
        panic!("expected optimize");
    };
    assert_eq!(args.codec, "libx265");
    assert_eq!(args.presets, vec!["fast", "slow"]);
    assert_eq!((args.quality_min, args.quality_max), (Some(18), Some(30)));
    assert_eq!(args.step, 2);
    assert_eq!(args.service, PathBuf::from("./trial-service"));
    assert_eq!(args.service_args, vec!["--fast-metrics"]);
    assert_eq!(
        args.options,
        vec![
            ("tune".to_string(), "grain".to_string()),
            ("x265-params".to_string(), "aq-mode=3".to_string()),
        ]
    );
    assert_eq!(args.audio, AudioArg::Copy);
    assert!(args.psnr && !args.ssim && !args.blockdetect);
    assert_eq!(args.jobs, Some(4));
    assert!(args.target_vmaf.is_none());
}

#[test]
fn test_invalid_arguments_rejected() {
    // Missing input.
    assert!(Cli::try_parse_from(["sweetspot", "analyze"]).is_err());
    // Malformed advanced option.
    assert!(
        Cli::try_parse_from([
            "sweetspot", "optimize", "in.mkv", "--service", "svc", "-o", "novalue"
        ])
        .is_err()
    );
    // Zero step.
    assert!(
        Cli::try_parse_from([
            "sweetspot", "optimize", "in.mkv", "--service", "svc", "--step", "0"
        ])
        .is_err()
    );
    // A given sample and a fixed start are mutually exclusive.
    assert!(
        Cli::try_parse_from([
            "sweetspot", "optimize", "in.mkv", "--service", "svc", "--sample", "s.mkv",
            "--start", "12"
        ])
        .is_err()
    );
}

#[test]
fn test_load_config() {
    assert_eq!(load_config(None).unwrap(), Default::default());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tuning.json");
    std::fs::write(&path, r#"{ "search": { "max_iterations": 5 } }"#).unwrap();
    assert_eq!(load_config(Some(path.as_path())).unwrap().search.max_iterations, 5);

    assert!(load_config(Some(dir.path().join("missing.json").as_path())).is_err());
}

#[cfg(unix)]
mod end_to_end {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use sweetspot_core::ProcessContext;

    /// Service whose VMAF falls and size shrinks with the quality value.
    const SERVICE: &str = r#"#!/bin/sh
request=$(cat)
q=$(printf '%s' "$request" | sed 's/.*"quality":\([0-9]*\).*/\1/')
vmaf=$((100 - q))
size=$((64 / (q - 15)))
echo "encoding q$q"
echo "{\"status\":\"success\",\"vmaf\":$vmaf,\"vmaf_1_low\":$vmaf,\"size_mb\":$size}"
"#;

    #[test]
    fn test_optimize_with_existing_sample() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("movie.mkv");
        let sample = dir.path().join("sample.mkv");
        std::fs::write(&input, b"source").unwrap();
        std::fs::write(&sample, b"sample").unwrap();

        let service = dir.path().join("service.sh");
        std::fs::write(&service, SERVICE).unwrap();
        std::fs::set_permissions(&service, std::fs::Permissions::from_mode(0o755)).unwrap();

        let report = dir.path().join("report.json");
        let work = dir.path().join("work");
        let args: Vec<String> = vec![
            "sweetspot".into(),
            "optimize".into(),
            input.display().to_string(),
            "--codec".into(),
            "libx264".into(),
            "--presets".into(),
            "medium".into(),
            "--quality-min".into(),
            "16".into(),
            "--quality-max".into(),
            "23".into(),
            "--service".into(),
            service.display().to_string(),
            "--sample".into(),
            sample.display().to_string(),
            "--work-dir".into(),
            work.display().to_string(),
            "--report".into(),
            report.display().to_string(),
            "-j".into(),
            "2".into(),
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        let cancelled = sweetspot_cli::run(cli, &ProcessContext::default()).unwrap();
        assert!(!cancelled);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json["mode"], "range_sweep");
        assert_eq!(json["total"], 8);
        assert_eq!(json["trials"].as_array().unwrap().len(), 8);
        assert!(json["sweet_spot"].is_object());
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
    }
}
