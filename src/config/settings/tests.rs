use super::*;
use tempfile::TempDir;

#[test]
fn default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.provider.protocol, "http");
    assert_eq!(settings.provider.host, "localhost");
    assert_eq!(settings.provider.port, 11434);
    assert_eq!(settings.provider.kind, ProviderKind::Ollama);
    assert_eq!(settings.storage.backend, StorageBackend::Sqlite);
    assert_eq!(settings.experiment.test_name, "rag_enhancement");
    assert!((settings.policy.re_vectorize_delta - 0.1).abs() < f64::EPSILON);
    assert!(settings.admin.identity.is_empty());
    assert!(settings.validate().is_ok());
}

#[test]
fn settings_validation() {
    let settings = Settings::default();

    let mut invalid = settings.clone();
    invalid.provider.protocol = "ftp".to_string();
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid = settings.clone();
    invalid.provider.timeout_secs = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.storage.read_attempts = 0;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidReadAttempts(0))
    ));

    let mut invalid = settings.clone();
    invalid.policy.re_vectorize_delta = 1.0;
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.policy.feedback_learning_rate = 0.0;
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.policy.context_cache_capacity = 0;
    assert!(invalid.validate().is_err());

    let mut invalid = settings.clone();
    invalid.experiment.test_name = "  ".to_string();
    assert!(invalid.validate().is_err());

    let mut invalid = settings;
    invalid.maintenance.sweep_interval_secs = 10;
    assert!(matches!(
        invalid.validate(),
        Err(ConfigError::InvalidSweepInterval(10))
    ));
}

#[test]
fn ollama_url_generation() {
    let settings = Settings::default();
    let url = settings
        .provider
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let settings = Settings::default();
    let toml_str = toml::to_string(&settings).expect("should serialize toml correctly");
    let parsed: Settings = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(settings, parsed);
}

#[test]
fn partial_toml_fills_defaults() {
    let parsed: Settings = toml::from_str(
        r#"
[provider]
kind = "hashing"

[admin]
identity = "admin-uid"
"#,
    )
    .expect("should parse partial toml");

    assert_eq!(parsed.provider.kind, ProviderKind::Hashing);
    assert_eq!(parsed.provider.port, 11434);
    assert_eq!(parsed.admin.identity, "admin-uid");
    assert_eq!(parsed.server, ServerSettings::default());
}

#[test]
fn setter_validation() {
    let mut provider = ProviderSettings::default();

    assert!(provider.set_protocol("https".to_string()).is_ok());
    assert!(provider.set_host("example.com".to_string()).is_ok());
    assert!(provider.set_port(8080).is_ok());

    assert!(provider.set_protocol("ftp".to_string()).is_err());
    assert!(provider.set_port(0).is_err());
    assert_eq!(provider.protocol, "https");
    assert_eq!(provider.port, 8080);
}

#[test]
fn load_missing_settings_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let settings = Settings::load(temp_dir.path()).expect("should load default settings");
    assert_eq!(settings.base_dir, temp_dir.path());
    assert_eq!(settings.provider, ProviderSettings::default());
    assert_eq!(settings.database_path(), temp_dir.path().join("rag.db"));
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut settings = Settings::load(temp_dir.path()).expect("should load default settings");
    settings.admin.identity = "admin-uid".to_string();
    settings.storage.backend = StorageBackend::Memory;
    settings.save().expect("should save settings");

    assert!(settings.config_file_path().exists());

    let reloaded = Settings::load(temp_dir.path()).expect("should reload settings");
    assert_eq!(reloaded, settings);
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[storage]\nread_attempts = 99\n",
    )
    .expect("should write config");

    assert!(Settings::load(temp_dir.path()).is_err());
}

#[test]
fn storage_policy_from_settings() {
    let mut settings = Settings::default();
    settings.storage.timeout_ms = 250;
    settings.storage.read_attempts = 2;

    let policy = settings.storage.policy();
    assert_eq!(policy.timeout, Duration::from_millis(250));
    assert_eq!(policy.read_attempts, 2);
}

#[test]
fn https_url_generation() {
    let mut settings = Settings::default();
    settings.provider.protocol = "https".to_string();
    settings.provider.host = "secure.example.com".to_string();
    settings.provider.port = 443;

    let url = settings
        .provider
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}
