use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "https://api.openai.com/v1");
    assert_eq!(config.api.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.api.timeout_seconds, 60);
    assert_eq!(config.embedding.model, "text-embedding-3-large");
    assert_eq!(config.generation.model, "gpt-4-turbo");
    assert_eq!(config.segmenting.max_segment_length, 8000);
    assert_eq!(config.retrieval.top_k, 3);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.api.base_url = "ftp://example.com".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.api.base_url = "not a url".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.api.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.api.retry_attempts = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.dimensions = Some(0);
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generation.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.segmenting.max_segment_length = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidSegmentLength(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.prompts.example = "no placeholder here".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidPromptTemplate { .. })
    ));
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
    let partial = r#"
        [retrieval]
        top_k = 5

        [segmenting]
        max_segment_length = 1200
    "#;

    let config: Config = toml::from_str(partial).expect("should parse partial toml");
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.segmenting.max_segment_length, 1200);
    assert_eq!(config.embedding.model, "text-embedding-3-large");
    assert_eq!(config.paths, PathsConfig::default());
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::load(temp_dir.path()).expect("should load default config");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.retrieval, RetrievalConfig::default());
}

#[test]
fn save_and_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config::load(temp_dir.path()).expect("should load default config");
    config.retrieval.top_k = 7;
    config.embedding.dimensions = Some(256);
    config.save().expect("should save config");

    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[retrieval]\ntop_k = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn data_paths_resolve_against_base_dir() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config::load(temp_dir.path()).expect("should load default config");

    assert_eq!(config.index_path(), temp_dir.path().join("embeddings.index"));
    assert_eq!(config.metadata_path(), temp_dir.path().join("metadata.json"));

    let absolute = temp_dir.path().join("elsewhere").join("corpus.json");
    config.paths.corpus = absolute.clone();
    assert_eq!(config.corpus_path(), absolute);
}

#[test]
fn setter_validation() {
    let mut api = ApiConfig::default();
    assert!(api.set_base_url("http://localhost:8080/v1".to_string()).is_ok());
    assert_eq!(api.base_url, "http://localhost:8080/v1");
    assert!(api.set_base_url("localhost".to_string()).is_err());
    assert_eq!(api.base_url, "http://localhost:8080/v1");

    assert!(api.set_timeout_seconds(600).is_ok());
    assert!(api.set_timeout_seconds(601).is_err());

    let mut embedding = EmbeddingConfig::default();
    assert!(embedding.set_model("text-embedding-3-small".to_string()).is_ok());
    assert!(embedding.set_model(String::new()).is_err());

    let mut generation = GenerationConfig::default();
    assert!(generation.set_model("gpt-4o".to_string()).is_ok());
    assert!(generation.set_model(" ".to_string()).is_err());
}

#[test]
#[serial]
fn api_key_from_environment() {
    let api = ApiConfig {
        api_key_env: "CHAPTER_RAG_TEST_KEY".to_string(),
        ..ApiConfig::default()
    };

    // SAFETY: serialized with the other environment-mutating tests
    unsafe { std::env::remove_var("CHAPTER_RAG_TEST_KEY") };
    assert!(matches!(api.api_key(), Err(ConfigError::MissingApiKey(_))));

    // SAFETY: serialized with the other environment-mutating tests
    unsafe { std::env::set_var("CHAPTER_RAG_TEST_KEY", "sk-test") };
    assert_eq!(api.api_key().expect("key should be read"), "sk-test");

    // SAFETY: serialized with the other environment-mutating tests
    unsafe { std::env::remove_var("CHAPTER_RAG_TEST_KEY") };
}

#[test]
fn config_error_converts_to_rag_error() {
    let error: RagError = ConfigError::InvalidTopK(0).into();
    assert!(error.is_fatal());
    assert!(error.to_string().contains("top_k"));
}
