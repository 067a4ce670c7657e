use std::path::PathBuf;

use sweetspot_core::codecs::{self, HardwareVendor};
use sweetspot_core::orchestrator::{CapReason, plan_worker_count_for};
use sweetspot_core::*;

#[test]
fn test_builder_sets_every_section() {
    let config = OptimizerConfigBuilder::new()
        .outlier_min_samples(20)
        .outlier_percentiles(0.1, 0.9)
        .iqr_multiplier(2.0)
        .keyframe_overlap(3)
        .probe_workers(6)
        .search_max_iterations(6)
        .search_tolerances(1e-2, 0.5)
        .parallel_jobs(3)
        .termination_grace_ms(500)
        .poll_interval_ms(50)
        .work_dir(PathBuf::from("/tmp/sweetspot-work"))
        .build()
        .unwrap();

    assert_eq!(config.analysis.outlier_min_samples, 20);
    assert_eq!(config.analysis.q1_percentile, 0.1);
    assert_eq!(config.analysis.q3_percentile, 0.9);
    assert_eq!(config.analysis.iqr_multiplier, 2.0);
    assert_eq!(config.analysis.keyframe_overlap, 3);
    assert_eq!(config.analysis.effective_probe_workers(), 6);
    assert_eq!(config.search.max_iterations, 6);
    assert_eq!(config.search.absolute_tolerance, 0.5);
    assert_eq!(config.orchestrator.parallel_jobs, 3);
    assert_eq!(config.orchestrator.termination_grace().as_millis(), 500);
    assert_eq!(config.orchestrator.work_root(), PathBuf::from("/tmp/sweetspot-work"));
}

#[test]
fn test_builder_rejects_invalid_values() {
    assert!(OptimizerConfigBuilder::new().parallel_jobs(0).build().is_err());
    assert!(
        OptimizerConfigBuilder::new()
            .outlier_percentiles(0.9, 0.1)
            .build()
            .is_err()
    );
}

#[test]
fn test_config_file_roundtrip_through_builder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "analysis": { "iqr_multiplier": 1.5 } }"#).unwrap();

    let loaded = OptimizerConfig::from_json_file(&path).unwrap();
    let config = OptimizerConfigBuilder::from_config(loaded)
        .parallel_jobs(2)
        .build()
        .unwrap();
    assert_eq!(config.analysis.iqr_multiplier, 1.5);
    assert_eq!(config.orchestrator.parallel_jobs, 2);
}

#[test]
fn test_malformed_config_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        OptimizerConfig::from_json_file(&path),
        Err(CoreError::Json(_))
    ));
}

#[test]
fn test_codec_registry_and_worker_plan() {
    let nvenc = codecs::all_codecs()
        .iter()
        .find(|c| c.hardware == Some(HardwareVendor::Nvidia))
        .expect("an NVENC codec is registered");

    let plan = plan_worker_count_for(8, 16, nvenc);
    assert_eq!(plan.workers, 5);
    assert!(matches!(plan.cap, Some(CapReason::VendorSessionLimit { .. })));

    let x264 = codecs::lookup("libx264").unwrap();
    let plan = plan_worker_count_for(8, 4, x264);
    assert_eq!(plan.workers, 4);
    assert!(matches!(plan.cap, Some(CapReason::PhysicalCores { cores: 4 })));

    assert!(matches!(codecs::lookup("mpeg1"), Err(CoreError::UnknownCodec(_))));
}
