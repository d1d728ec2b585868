use std::io::Write;

use tempfile::NamedTempFile;
use textgen_engine::{EngineError, GenerationEngine, ModelEngine, ModelOptions, SamplingParams, TokenModel};
use textgen_runtime::{build_engine, Backend, BigramModel, EngineConfig, BOS_TOKEN, EOS_TOKEN};

fn corpus(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn engine(file: &NamedTempFile, n_ctx: usize) -> ModelEngine<BigramModel> {
    ModelEngine::load(&ModelOptions::new(file.path()).with_n_ctx(n_ctx)).unwrap()
}

// -- Loading --

#[test]
fn load_counts_sequences() {
    let file = corpus("abc\nabc\nabd\n");
    let model = BigramModel::load(file.path(), &Default::default()).unwrap();
    assert_eq!(model.sequences(), 3);
    assert_eq!(model.eos(), EOS_TOKEN);
    assert_eq!(model.n_vocab(), 258);
}

#[test]
fn missing_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");
    let err = ModelEngine::<BigramModel>::load(&ModelOptions::new(&path))
        .err()
        .unwrap();
    match err {
        EngineError::Configuration(msg) => assert!(msg.contains("absent.txt"), "{msg}"),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn blank_corpus_is_configuration_error() {
    let file = corpus("\n\r\n\n");
    let err = ModelEngine::<BigramModel>::load(&ModelOptions::new(file.path()))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Configuration(_)));
}

// -- Generation --

#[test]
fn greedy_replays_most_frequent_continuation() {
    let file = corpus("abc\nabc\nabd\n");
    let engine = engine(&file, 64);
    let r = engine
        .generate("bigram", "a", &SamplingParams::default(), "s")
        .unwrap();
    assert_eq!(r.text, "bc");
    assert_eq!(r.prompt_tokens, 2);
    assert_eq!(r.completion_tokens, 2);
    assert_eq!(
        engine.session_tokens("s").unwrap(),
        vec![BOS_TOKEN, 97, 98, 99]
    );
}

#[test]
fn continuing_session_skips_bos() {
    let file = corpus("abc\nabc\nabd\n");
    let engine = engine(&file, 64);
    engine
        .generate("bigram", "a", &SamplingParams::default(), "s")
        .unwrap();
    let r = engine
        .generate("bigram", "a", &SamplingParams::default(), "s")
        .unwrap();
    assert_eq!(r.prompt_tokens, 1);
    assert_eq!(r.text, "bc");
    assert_eq!(engine.session_tokens("s").unwrap().len(), 7);
}

#[test]
fn max_tokens_truncates() {
    let file = corpus("abc\n");
    let engine = engine(&file, 64);
    let r = engine
        .generate("bigram", "a", &SamplingParams::default().with_max_tokens(1), "")
        .unwrap();
    assert_eq!(r.text, "b");
    assert_eq!(r.completion_tokens, 1);
}

#[test]
fn ignore_eos_runs_full_budget() {
    let file = corpus("abc\n");
    let engine = engine(&file, 64);
    let params = SamplingParams::default()
        .with_max_tokens(4)
        .with_ignore_eos(true);
    let r = engine.generate("bigram", "a", &params, "").unwrap();
    assert_eq!(r.completion_tokens, 4);
    assert!(r.text.starts_with("bc"));
}

#[test]
fn context_overflow_keeps_evaluated_history() {
    let file = corpus("abc\n");
    let engine = engine(&file, 3);
    let err = engine
        .generate("bigram", "a", &SamplingParams::default(), "s")
        .unwrap_err();
    assert!(matches!(err, EngineError::Runtime(_)));
    assert_eq!(engine.session_tokens("s").unwrap(), vec![BOS_TOKEN, 97, 98]);

    // The engine stays usable for other sessions.
    let r = engine
        .generate("bigram", "a", &SamplingParams::default().with_max_tokens(1), "t")
        .unwrap();
    assert_eq!(r.text, "b");
}

#[test]
fn multibyte_prompt_round_trips_through_bytes() {
    let file = corpus("héxo\n");
    let engine = engine(&file, 64);
    let r = engine
        .generate("bigram", "h", &SamplingParams::default(), "")
        .unwrap();
    assert_eq!(r.text, "éxo");
    assert_eq!(r.completion_tokens, 4);
}

#[test]
fn unseen_prompt_byte_stops_immediately() {
    let file = corpus("abc\n");
    let engine = engine(&file, 64);
    let r = engine
        .generate("bigram", "z", &SamplingParams::default().with_max_tokens(4), "")
        .unwrap();
    assert_eq!(r.text, "");
    assert_eq!(r.completion_tokens, 0);
}

#[test]
fn streamed_chunks_reassemble_multibyte_text() {
    let file = corpus("xé\n");
    let engine = engine(&file, 64);
    let mut chunks = Vec::new();
    let r = engine
        .generate_stream(
            "bigram",
            "x",
            &SamplingParams::default(),
            "",
            &mut |chunk| chunks.push(chunk),
        )
        .unwrap();

    assert_eq!(r.text, "é");
    let streamed: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(streamed, r.text);
    assert!(!streamed.contains('\u{FFFD}'));
}

// -- Backend wiring --

#[test]
fn build_engine_loads_model_backend() {
    let file = corpus("abc\n");
    let config = EngineConfig::model(ModelOptions::new(file.path()));
    assert_eq!(config.backend, Backend::Model);

    let engine = build_engine(&config).unwrap();
    assert_eq!(engine.name(), "model");
    let r = engine
        .generate("bigram", "a", &SamplingParams::default(), "")
        .unwrap();
    assert_eq!(r.text, "bc");
}

#[test]
fn build_engine_echo_ignores_model_options() {
    let config = EngineConfig {
        backend: Backend::Echo,
        model: ModelOptions::new("/nonexistent"),
    };
    let engine = build_engine(&config).unwrap();
    let r = engine
        .generate("m", "hi", &SamplingParams::default(), "s")
        .unwrap();
    assert_eq!(r.text, "[echo model=m session_id=s] hi");
}
