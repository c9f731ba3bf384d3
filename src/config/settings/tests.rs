use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "all-minilm:latest");
    assert_eq!(config.ollama.embedding_dimension, 384);
    assert!((config.retrieval.answer_threshold - 0.20).abs() < f32::EPSILON);
    assert!((config.retrieval.search_threshold - 0.15).abs() < f32::EPSILON);
    assert_eq!(config.retrieval.search_limit, 5);
    assert_eq!(config.retrieval.category_limit, 3);
    assert_eq!(config.retrieval.fallback_message, DEFAULT_FALLBACK_MESSAGE);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.answer_threshold = 1.5;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.search_limit = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.fallback_message = "   ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.storage.corpus_file = invalid_config.storage.index_file.clone();
    assert!(invalid_config.validate().is_err());
}

#[test]
fn threshold_bounds_are_inclusive() {
    assert!(validate_threshold(-1.0).is_ok());
    assert!(validate_threshold(1.0).is_ok());
    assert!(validate_threshold(0.0).is_ok());
    assert!(validate_threshold(1.0001).is_err());
    assert!(validate_threshold(f32::NAN).is_err());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial_toml = r#"
        [ollama]
        host = "custom-host"

        [retrieval]
        search_limit = 8
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse partial toml");
    assert_eq!(config.ollama.host, "custom-host");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.retrieval.search_limit, 8);
    assert!((config.retrieval.answer_threshold - 0.20).abs() < f32::EPSILON);
    assert_eq!(config.storage, StorageConfig::default());
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(768).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_embedding_dimension(4).is_err());

    let mut retrieval = RetrievalConfig::default();
    assert!(retrieval.set_answer_threshold(0.5).is_ok());
    assert!(retrieval.set_search_threshold(-0.2).is_ok());
    assert!(retrieval.set_search_limit(10).is_ok());
    assert!(retrieval.set_answer_threshold(2.0).is_err());
    assert!(retrieval.set_search_limit(101).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load_from(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.index_path(), temp_dir.path().join("qa_index.bin"));
    assert_eq!(config.corpus_path(), temp_dir.path().join("corpus.jsonl"));
}

#[test]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.ollama.model = "custom-model".to_string();
    config.retrieval.search_limit = 7;
    config.save().expect("should save config");

    let loaded = Config::load_from(temp_dir.path()).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\nanswer_threshold = 3.0\n",
    )
    .expect("should write config");

    assert!(Config::load_from(temp_dir.path()).is_err());
}

#[test]
fn absolute_storage_paths_are_kept() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: PathBuf::from("/var/lib/qa"),
        ..Config::default()
    };
    config.storage.index_file = temp_dir.path().join("elsewhere.bin");

    assert_eq!(config.index_path(), temp_dir.path().join("elsewhere.bin"));
    assert_eq!(config.corpus_path(), PathBuf::from("/var/lib/qa/corpus.jsonl"));
}

#[test]
#[serial]
fn home_env_var_overrides_config_dir() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };
    let dir = Config::config_dir();
    unsafe { std::env::remove_var(HOME_ENV_VAR) };

    assert_eq!(dir.expect("should resolve config dir"), temp_dir.path());
}
