// CLI commands for verifying submissions and managing challenges
use anyhow::{bail, Context, Result};
use sandcheck_common::config::EngineConfig;
use sandcheck_common::types::{Submission, VerifyResponse};
use sandcheck_engine::algorithmic::describe_call;
use sandcheck_engine::challenges::{ChallengesJson, Challenge};
use sandcheck_engine::Engine;
use std::fs;
use std::path::Path;

const DEFAULT_CHALLENGES_PATH: &str = "config/challenges.json";

/// Starter definitions written by `init`
const STARTER_CHALLENGES: &str = include_str!("../../../config/challenges.json");

/// Build an engine from `SANDCHECK_*` settings plus extra challenge definitions
pub fn load_engine(challenges: Option<&Path>) -> Result<Engine> {
    let mut config = EngineConfig::from_env().context("Invalid SANDCHECK_* configuration")?;
    if let Some(path) = challenges {
        config.challenges_path = Some(path.to_path_buf());
    } else if config.challenges_path.is_none() && Path::new(DEFAULT_CHALLENGES_PATH).exists() {
        config.challenges_path = Some(DEFAULT_CHALLENGES_PATH.into());
    }
    Engine::new(config).context("Failed to load challenge definitions")
}

/// Verify `file` against `challenge_id`; returns whether the verdict is correct
pub async fn verify_file(engine: &Engine, challenge_id: &str, file: &Path, json: bool) -> Result<bool> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read submission: {}", file.display()))?;

    let submission = Submission::new(source, challenge_id);
    let verdict = engine
        .verify(&submission)
        .await
        .with_context(|| format!("Cannot verify against '{}'", challenge_id))?;
    let is_correct = verdict.is_correct;

    if json {
        let response = VerifyResponse::from(verdict);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(is_correct);
    }

    println!("🔍 Verifying {} against '{}'", file.display(), challenge_id);
    println!();
    for result in &verdict.results {
        let mark = if result.pass { "✅" } else { "❌" };
        match result.execution_time_ms {
            Some(ms) => println!("  {} {} ({} ms)", mark, result.message, ms),
            None => println!("  {} {}", mark, result.message),
        }
    }
    println!();

    if is_correct {
        println!("✅ All {} checks passed!", verdict.total());
    } else {
        println!("❌ {}/{} checks passed", verdict.passed_count(), verdict.total());
    }

    Ok(is_correct)
}

pub fn list_challenges(engine: &Engine) {
    println!("📋 {} challenges registered:\n", engine.registry().len());
    for challenge in engine.registry().iter() {
        println!(
            "  {:<20} {:<10} {:<24} {} checks",
            challenge.id(),
            challenge.kind().to_string(),
            challenge.title(),
            challenge.check_count()
        );
    }
}

pub fn show_challenge(engine: &Engine, challenge_id: &str) -> Result<()> {
    let challenge = engine.registry().get(challenge_id)?;

    println!("📌 {} ({})", challenge.title(), challenge.id());
    println!("   kind: {}", challenge.kind());
    println!("   entry point: {}", challenge.entry_point());
    if !challenge.description().is_empty() {
        println!("\n{}", challenge.description());
    }

    println!("\n📋 Checks:");
    match challenge {
        Challenge::Algorithm(c) => {
            for (index, fixture) in c.fixtures.iter().enumerate() {
                println!(
                    "  {}. {} => {}",
                    index + 1,
                    describe_call(&c.entry_point, &fixture.input),
                    fixture.expected.preview(60)
                );
            }
        }
        Challenge::Ui(_) => {
            for (index, name) in challenge.check_names().iter().enumerate() {
                println!("  {}. {}", index + 1, name);
            }
        }
    }

    Ok(())
}

/// Initialize a project directory with a starter challenge file
pub async fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing Sandcheck project at: {}", path);

    let project_path = Path::new(path);
    let config_dir = project_path.join("config");
    fs::create_dir_all(&config_dir).context("Failed to create directory: config")?;
    println!("  ✅ Created: config");

    // refuse to ship a starter file the engine would reject
    let starter: ChallengesJson =
        serde_json::from_str(STARTER_CHALLENGES).context("Failed to parse starter challenges")?;
    if starter.challenges.is_empty() {
        bail!("Starter challenge file is empty");
    }

    let challenges_path = config_dir.join("challenges.json");
    if challenges_path.exists() {
        println!("  ⚠️  Kept existing: config/challenges.json");
    } else {
        let json_content = serde_json::to_string_pretty(&starter)?;
        fs::write(&challenges_path, json_content).context("Failed to write challenges.json")?;
        println!("  ✅ Created: config/challenges.json");
    }

    println!("✅ Project initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Edit config/challenges.json to add fixtures");
    println!("  2. List challenges: sandcheck-cli list");
    println!("  3. Verify a solution: sandcheck-cli verify --challenge <id> --file solution.js");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("sandcheck-cli-{}-{}-{}", label, std::process::id(), nanos))
    }

    #[tokio::test]
    async fn test_init_writes_loadable_challenges() {
        let dir = scratch_dir("init");
        init_project(dir.to_str().unwrap()).await.unwrap();

        let written = dir.join("config/challenges.json");
        assert!(written.exists());
        let engine = load_engine(Some(&written)).unwrap();
        assert!(engine.registry().get("sum-array").is_ok());

        // second run keeps the file
        init_project(dir.to_str().unwrap()).await.unwrap();
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_verify_file_reports_correctness() {
        let dir = scratch_dir("verify");
        fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.js");
        let bad = dir.join("bad.js");
        fs::write(&good, "function reverseString(s) { return [...s].reverse().join(''); }").unwrap();
        fs::write(&bad, "function reverseString(s) { return s; }").unwrap();

        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert!(verify_file(&engine, "reverse-string", &good, true).await.unwrap());
        assert!(!verify_file(&engine, "reverse-string", &bad, false).await.unwrap());
        assert!(verify_file(&engine, "no-such-challenge", &good, false).await.is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
