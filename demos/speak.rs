use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use piper_local::{
    catalog::VoiceCatalog,
    config::TtsConfig,
    context::TtsContext,
    engines::piper::PiperEngine,
    fetch::HttpAssetFetcher,
    language::{detect_language, find_matching_language_code},
    text::{char_count, word_count},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let catalog_path = PathBuf::from(args.next().unwrap_or_else(|| "voices.json".to_string()));
    let text = args.next().unwrap_or_else(|| {
        "Hello! This is Piper, a fast local text to speech system. \
         Voices are downloaded once and cached for offline use."
            .to_string()
    });

    let config = match std::env::var("PIPER_LOCAL_CONFIG") {
        Ok(path) => TtsConfig::from_json_file(path)?,
        Err(_) => TtsConfig::default(),
    };
    let catalog = VoiceCatalog::from_json_file(&catalog_path)?;
    let fetcher = Arc::new(HttpAssetFetcher::new(&config.voices_base_url));
    let context = TtsContext::initialize(config, catalog, fetcher).await?;

    println!(
        "Input: {} words, {} characters",
        word_count(&text),
        char_count(&text)
    );

    let detected = detect_language(&text);
    let language = find_matching_language_code(detected, Some(context.catalog().languages()))
        .or_else(|| context.catalog().default_language().map(|l| l.code.clone()))
        .ok_or("voice catalog is empty")?;
    let voice = context
        .catalog()
        .default_voice_for_language(&language)
        .ok_or("no voice for language")?
        .clone();
    println!(
        "Detected {:?}, speaking with {} ({})",
        detected, voice.id, voice.quality
    );

    if !context.cache().verify_model_cache(&voice).await {
        let on_download = |percent: u8| println!("Downloading {}: {percent}%", voice.id);
        context.cache().download_model(&voice, Some(&on_download)).await?;
    }

    let orchestrator = context.orchestrator(Arc::new(PiperEngine::new()));
    let on_progress = |p: piper_local::synthesis::SynthesisProgress| {
        println!(
            "Chunk {}/{}: {:.0}%",
            p.current_chunk_index, p.total_chunks, p.percent
        );
    };

    let synth_start = Instant::now();
    let audio = orchestrator
        .generate_audio(&text, &voice, 1.0, Some(&on_progress))
        .await?;
    let synth_dur = synth_start.elapsed();

    let speedup = audio.duration_secs() / synth_dur.as_secs_f64();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        audio.duration_secs(),
        synth_dur,
        speedup
    );

    audio.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    context.shutdown().await?;
    Ok(())
}
