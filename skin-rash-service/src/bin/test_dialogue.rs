use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rash_dialogue::{AnalysisRequest, DialogueTurn, ImagePayload, PipelineMode, Stage};
use skin_rash_service::{Config, build_orchestrator};
use std::env;
use std::io::{self, BufRead, Write};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Skin Rash Dialogue -> Differential Diagnosis Test");
    println!("=================================================");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <image_path> [strict_local|native_direct]", args[0]);
        eprintln!("Example: {} /path/to/rash.jpg strict_local", args[0]);
        std::process::exit(1);
    }

    let mode = match args.get(2).map(String::as_str) {
        None | Some("native_direct") => PipelineMode::NativeDirect,
        Some("strict_local") => PipelineMode::StrictLocal,
        Some(other) => {
            eprintln!("Unknown pipeline mode: {}", other);
            std::process::exit(1);
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Example: export OPENROUTER_API_KEY='your_key_here'");
            std::process::exit(1);
        }
    };

    let image = ImagePayload::new(STANDARD.encode(tokio::fs::read(&args[1]).await?));
    let orchestrator = build_orchestrator(&config).await;

    println!("Image: {}", args[1]);
    println!("Mode: {:?}", mode);
    println!("Reasoning model: {}", config.reasoning_model);
    println!("Captioning model: {}", config.blip_model);
    println!();

    let stdin = io::stdin();
    let mut history: Vec<DialogueTurn> = Vec::new();

    loop {
        let response = orchestrator
            .process(AnalysisRequest {
                image: image.clone(),
                mode,
                history: history.clone(),
            })
            .await;

        match (response.stage, response.final_diagnosis) {
            (Stage::Questioning, _) => {
                println!("Assistant:");
                println!("{}", response.content);
                println!();
                print!("Your answer: ");
                io::stdout().flush()?;

                let mut answer = String::new();
                if stdin.lock().read_line(&mut answer)? == 0 {
                    println!("No answer given, stopping.");
                    return Ok(());
                }

                history = response.updated_history;
                history.push(DialogueTurn::user(answer.trim()));
            }
            (Stage::Diagnosis, Some(diagnosis)) => {
                println!("Differential diagnosis:");
                println!("────────────────────────");
                for (i, option) in diagnosis.diagnosis_options.iter().enumerate() {
                    println!("   {}. {}", i + 1, option);
                }
                println!();
                println!("Key differences: {}", diagnosis.key_differences);
                println!("Symptoms to check: {}", diagnosis.symptoms_to_check.join(", "));
                println!("Diagnostic methods: {}", diagnosis.diagnostic_methods.join(", "));
                println!();
                println!("{}", diagnosis.disclaimer);
                return Ok(());
            }
            (Stage::Diagnosis, None) => {
                eprintln!("{}", response.content);
                eprintln!();
                eprintln!("Troubleshooting:");
                eprintln!("   - Ensure OPENROUTER_API_KEY is valid");
                eprintln!("   - Check that the image file is a readable JPEG/PNG");
                eprintln!("   - strict_local needs the BLIP weights from the Hugging Face hub");
                std::process::exit(1);
            }
        }
    }
}
