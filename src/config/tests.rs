use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            ollama: OllamaConfig {
                protocol: "https".to_string(),
                host: "test-host".to_string(),
                port: 8080,
                model: "test-model".to_string(),
                batch_size: 32,
                ..OllamaConfig::default()
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [ollama
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let invalid_toml = r#"
            [retrieval]
            search_limit = "five"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [ollama]
            protocol = "http"
            host = "localhost"
            port = 11434
            model = "all-minilm:latest"
            batch_size = 64
            embedding_dimension = 384
            timeout_seconds = 10
            retry_attempts = 2

            [retrieval]
            answer_threshold = 0.25
            search_threshold = 0.1
            search_limit = 10
            category_limit = 4
            fallback_message = "Ask a human."

            [storage]
            index_file = "faq.bin"
            corpus_file = "faq.jsonl"
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml correctly");
        assert!(config.validate().is_ok());
        assert_eq!(config.ollama.batch_size, 64);
        assert_eq!(config.ollama.retry_attempts, 2);
        assert_eq!(config.retrieval.category_limit, 4);
        assert_eq!(config.retrieval.fallback_message, "Ask a human.");
        assert_eq!(config.storage.index_file, std::path::PathBuf::from("faq.bin"));
    }

    #[test]
    fn artifact_paths_follow_base_dir() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config = Config::load_from(temp_dir.path()).expect("should load defaults");

        let paths = config.artifact_paths();
        assert_eq!(paths.index, temp_dir.path().join("qa_index.bin"));
        assert_eq!(paths.corpus, temp_dir.path().join("corpus.jsonl"));
    }
}
