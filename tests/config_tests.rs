use dream_canvas::config::Configuration;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
service:
  base-url: "http://gpu-box:7860/"
  request-timeout: 2m
  denoising-strength: 0.55
generation:
  prompt: "flooded cathedral, volumetric light"
  steps: 25
  width: 768
  height: 512
  seed: 1234
  rearm-on-failure: false
viewer:
  title: "Canvas"
  frame-rate: 30
  tile-radius: 2
artifacts:
  enabled: false
  generated-image: out/latest.png
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.service.base_url, "http://gpu-box:7860/");
    assert_eq!(cfg.service.request_timeout, Some(Duration::from_secs(120)));
    assert!((cfg.service.denoising_strength - 0.55).abs() < f32::EPSILON);
    assert!((cfg.service.guidance_scale - 3.0).abs() < f32::EPSILON);
    assert_eq!(cfg.generation.prompt, "flooded cathedral, volumetric light");
    assert_eq!(cfg.generation.steps, 25);
    assert_eq!((cfg.generation.width, cfg.generation.height), (768, 512));
    assert_eq!(cfg.generation.seed, Some(1234));
    assert!(cfg.generation.generate_on_start);
    assert!(!cfg.generation.rearm_on_failure);
    assert_eq!(cfg.viewer.title, "Canvas");
    assert!((cfg.viewer.frame_interval().as_secs_f64() - 1.0 / 30.0).abs() < 1e-6);
    assert_eq!(cfg.viewer.tile_radius, 2);
    assert!(!cfg.artifacts.enabled);
    assert_eq!(cfg.artifacts.generated_image, PathBuf::from("out/latest.png"));
    assert_eq!(cfg.artifacts.seed_image, PathBuf::from("init_image.jpg"));
    cfg.validated().unwrap();
}

#[test]
fn from_yaml_file_reads_and_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dream.yaml");
    std::fs::write(&path, "generation:\n  prompt: \"moss\"\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.generation.prompt, "moss");

    let missing = dir.path().join("missing.yaml");
    let err = Configuration::from_yaml_file(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}

#[test]
fn rejects_non_http_base_url() {
    let yaml = r#"
service:
  base-url: "ftp://example.invalid"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("base-url"));
}

#[test]
fn rejects_out_of_range_values() {
    for yaml in [
        "service:\n  denoising-strength: 1.5\n",
        "generation:\n  steps: 0\n",
        "generation:\n  prompt: \"   \"\n",
        "viewer:\n  frame-rate: 0\n",
        "viewer:\n  tile-radius: 0\n",
        "viewer:\n  capture-jpeg-quality: 0\n",
    ] {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "accepted {yaml:?}");
    }
}

#[test]
fn unknown_duration_format_fails_to_parse() {
    let yaml = r#"
service:
  request-timeout: "soon"
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}
