use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Variables the binary reads; cleared so the host environment cannot leak in.
const ENV_VARS: &[&str] = &[
    "TARGET_CHARS",
    "OVERLAP",
    "ASSUNTO",
    "AREA_INTERESSE",
    "PROVIDER",
    "AOAI_ENDPOINT",
    "AOAI_KEY",
    "AOAI_EMB_DEPLOYMENT",
    "AOAI_API_VERSION",
    "OPENAI_API_KEY",
    "OPENAI_EMB_MODEL",
    "EMB_DIM",
    "BATCH_SIZE",
    "SEARCH_ENDPOINT",
    "SEARCH_API_KEY",
    "SEARCH_INDEX",
    "SEARCH_API_VERSION",
    "AZURE_STORAGE_ACCOUNT",
    "AZURE_STORAGE_KEY",
];

fn kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("portarias")).unwrap();
    fs::write(
        files_dir.join("portarias").join("AC_2025_Portaria_45.txt"),
        "PORTARIA CGRH nº 45, de 10/02/2025\n\n\
         Dispõe sobre o processo de atribuição de classes e aulas, nos termos da \
         Resolução SEDUC nº 12/2025.\n\n\
         Art. 1º As inscrições dos docentes ocorrerão de 01/03 a 15/03/2025.\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("glossario.md"),
        "# Glossário\n\nPEI: Programa Ensino Integral.\n\nEJA: Educação de Jovens e Adultos.\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("notas.txt"),
        "Notas gerais sobre o calendário escolar.\n".repeat(80),
    )
    .unwrap();
    fs::write(files_dir.join("ignorado.xlsx"), b"PK\x03\x04").unwrap();

    let config_content = r#"[chunking]
target_chars = 1000
overlap = 100

[kb]
assunto = "atribuicao"
area_interesse = "conhecimento"

[search]
index = "kb-teste"
"#;
    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kb_with_env(
    config_path: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> (String, String, bool) {
    let binary = kb_binary();
    let mut cmd = Command::new(&binary);
    cmd.current_dir(config_path.parent().unwrap())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_kb_with_env(config_path, args, &[])
}

fn root_of(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().to_path_buf()
}

fn build(config_path: &Path, output: &Path) -> String {
    let files = root_of(config_path).join("files");
    let (stdout, stderr, success) = run_kb(
        config_path,
        &[
            "build",
            "--input-dir",
            files.to_str().unwrap(),
            "--output-jsonl",
            output.to_str().unwrap(),
        ],
    );
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    stdout
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_build_writes_jsonl() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("out").join("kb.jsonl");

    let stdout = build(&config_path, &output);
    assert!(stdout.contains("files found: 3"), "stdout={}", stdout);
    assert!(stdout.contains("files processed: 3"));
    assert!(stdout.trim_end().ends_with("ok"));

    let records = read_lines(&output);
    assert!(records.len() >= 4, "expected several chunks, got {}", records.len());

    // Sorted by file name: AC_2025_Portaria_45.txt, glossario.md, notas.txt.
    let first = &records[0];
    assert_eq!(first["id"], "portarias/AC_2025_Portaria_45.txt#chunk1");
    assert_eq!(first["id_original"], first["id"]);
    assert_eq!(first["chunk"], 1);
    assert_eq!(first["conhecimento"], "Atribuição de Classes (AC)");
    assert_eq!(first["norma_tipo"], "Portaria");
    assert_eq!(first["orgao_emissor"], "CGRH");
    assert_eq!(first["ano_letivo"], "2025");
    assert_eq!(first["prazo_inicio"], "2025-03-01");
    assert_eq!(first["prazo_fim"], "2025-03-15");
    assert_eq!(first["data_publicacao"], "2025-02-10");
    assert_eq!(first["doc_title"], "PORTARIA CGRH nº 45, de 10/02/2025");
    assert_eq!(first["assunto"], "atribuicao");
    assert_eq!(first["text"], first["content"]);

    let glossary = records
        .iter()
        .find(|r| r["source_file"] == "glossario.md")
        .unwrap();
    assert_eq!(glossary["is_glossario"], true);
    assert_eq!(glossary["doc_title"], "glossario");
}

#[test]
fn test_build_is_deterministic() {
    let (tmp, config_path) = setup_test_env();
    let first = tmp.path().join("a.jsonl");
    let second = tmp.path().join("b.jsonl");

    build(&config_path, &first);
    build(&config_path, &second);

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_build_chunk_numbers_are_contiguous() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("kb.jsonl");
    build(&config_path, &output);

    let notes: Vec<_> = read_lines(&output)
        .into_iter()
        .filter(|r| r["source_file"] == "notas.txt")
        .collect();
    assert!(notes.len() > 1);
    for (i, rec) in notes.iter().enumerate() {
        assert_eq!(rec["chunk"], i as u64 + 1);
        assert!(rec["text"].as_str().unwrap().chars().count() <= 1000 + 150);
    }
}

#[test]
fn test_build_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("kb.jsonl");
    let files = tmp.path().join("files");

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &[
            "build",
            "--input-dir",
            files.to_str().unwrap(),
            "--output-jsonl",
            output.to_str().unwrap(),
            "--dry-run",
        ],
    );
    assert!(success, "dry-run failed: {}", stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("estimated chunks:"));
    assert!(!output.exists());
}

#[test]
fn test_build_rejects_overlap_not_smaller_than_target() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");
    let output = tmp.path().join("kb.jsonl");

    let (_, stderr, success) = run_kb(
        &config_path,
        &[
            "build",
            "--input-dir",
            files.to_str().unwrap(),
            "--output-jsonl",
            output.to_str().unwrap(),
            "--target-chars",
            "500",
            "--overlap",
            "500",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr={}", stderr);
    assert!(!output.exists());
}

#[test]
fn test_build_cli_overrides_labels() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");
    let output = tmp.path().join("kb.jsonl");

    let (_, stderr, success) = run_kb(
        &config_path,
        &[
            "build",
            "--input-dir",
            files.to_str().unwrap(),
            "--output-jsonl",
            output.to_str().unwrap(),
            "--assunto",
            "remocao",
        ],
    );
    assert!(success, "build failed: {}", stderr);
    assert!(read_lines(&output).iter().all(|r| r["assunto"] == "remocao"));
}

#[test]
fn test_build_cli_override_fixes_invalid_env_chunking() {
    let (tmp, config_path) = setup_test_env();
    let files = tmp.path().join("files");
    let output = tmp.path().join("kb.jsonl");

    let (_, stderr, success) = run_kb_with_env(
        &config_path,
        &[
            "build",
            "--input-dir",
            files.to_str().unwrap(),
            "--output-jsonl",
            output.to_str().unwrap(),
            "--overlap",
            "10",
        ],
        &[("TARGET_CHARS", "200"), ("OVERLAP", "300")],
    );
    assert!(success, "build failed: {}", stderr);
    for rec in read_lines(&output) {
        assert!(rec["text"].as_str().unwrap().chars().count() <= 200 + 150 + 10);
    }
}

#[test]
fn test_build_missing_input_dir_fails() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("kb.jsonl");
    let (_, stderr, success) = run_kb(
        &config_path,
        &[
            "build",
            "--input-dir",
            "/definitely/not/here",
            "--output-jsonl",
            output.to_str().unwrap(),
        ],
    );
    assert!(!success);
    assert!(stderr.contains("does not exist"), "stderr={}", stderr);
}

#[test]
fn test_ingest_without_embedding_endpoint_fails_before_network() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("kb.jsonl");
    build(&config_path, &output);

    let (_, stderr, success) = run_kb_with_env(
        &config_path,
        &["ingest", "--jsonl-path", output.to_str().unwrap()],
        &[("SEARCH_ENDPOINT", "https://example.invalid")],
    );
    assert!(!success);
    assert!(stderr.contains("AOAI_ENDPOINT"), "stderr={}", stderr);
}

#[test]
fn test_ingest_without_search_key_fails() {
    let (tmp, config_path) = setup_test_env();
    let output = tmp.path().join("kb.jsonl");
    build(&config_path, &output);

    let (_, stderr, success) = run_kb_with_env(
        &config_path,
        &["ingest", "--jsonl-path", output.to_str().unwrap()],
        &[
            ("AOAI_ENDPOINT", "https://example.invalid"),
            ("AOAI_KEY", "k"),
            ("SEARCH_ENDPOINT", "https://example.invalid"),
        ],
    );
    assert!(!success);
    assert!(stderr.contains("SEARCH_API_KEY"), "stderr={}", stderr);
}

#[test]
fn test_index_delete_requires_endpoint() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_kb(&config_path, &["index", "delete"]);
    assert!(!success);
    assert!(stderr.contains("SEARCH_ENDPOINT"), "stderr={}", stderr);
}

#[test]
fn test_explicit_missing_config_fails() {
    let (tmp, _config_path) = setup_test_env();
    let missing = tmp.path().join("config").join("nope.toml");
    let (_, stderr, success) = run_kb(&missing, &["index", "delete"]);
    assert!(!success);
    assert!(stderr.contains("failed to read config file"), "stderr={}", stderr);
}

#[test]
fn test_capabilities() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_kb(&config_path, &["capabilities"]);
    assert!(success);
    assert!(stdout.contains("text=yes"));
    assert!(stdout.contains("ok"));
}
