use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use llm_core::{OpenAiClient, TokenSource};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tts_core::{install_crypto_provider, AudioOutput, MissingDevice, OutputDevice};

use voice_agent::http::{self, AppState};
use voice_agent::{deepgram, microphone, AgentConfig, Pipeline};

/// How long the transcription socket gets to flush its last results.
const TRANSCRIBER_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting voice agent...");
    install_crypto_provider();
    let config = AgentConfig::from_env().context("Invalid configuration")?;

    let output: Arc<dyn AudioOutput> = match OutputDevice::init(config.output_device.as_deref()) {
        Ok(device) => Arc::new(device),
        Err(e) => {
            error!("No usable audio output: {}", e);
            Arc::new(MissingDevice::new(e.to_string()))
        }
    };

    let tokens: Arc<dyn TokenSource> = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.chat.clone(),
    ));
    info!("Replies from {} spoken with voice {}", config.chat.model, config.voice_id);

    let pipeline = Pipeline::new(
        tokens,
        output,
        config.voice_id.clone(),
        config.synthesis.clone(),
        config.audio_format,
    );
    let (handle, worker) = pipeline.spawn(config.queue_capacity);

    if let Some(port) = config.control_port {
        let state = AppState {
            pipeline: handle.clone(),
        };
        let timeout = config.request_timeout();
        tokio::spawn(async move {
            if let Err(e) = http::serve(port, state, timeout).await {
                error!("Control surface stopped: {:#}", e);
            }
        });
    }

    // The capture stream must stay alive (and on this task) while recording.
    let capture = match config.deepgram.clone() {
        Some(deepgram_config) => {
            let (audio_tx, audio_rx) = mpsc::unbounded_channel();
            let (stream, format) = microphone::start_capture(audio_tx)?;
            let transcriber = tokio::spawn(deepgram::transcribe(
                deepgram_config,
                format,
                audio_rx,
                handle.clone(),
            ));
            Some((stream, transcriber))
        }
        None => {
            warn!("DEEPGRAM_API_KEY not set, microphone transcription disabled");
            None
        }
    };
    drop(handle);

    println!("Press Enter to stop recording...\n");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = stdin.next_line() => {}
    }

    if let Some((stream, transcriber)) = capture {
        // Dropping the stream closes the audio channel, which ends the socket.
        drop(stream);
        match tokio::time::timeout(TRANSCRIBER_DRAIN, transcriber).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("Could not open socket: {:#}", e),
            Ok(Err(e)) => error!("Transcriber task failed: {}", e),
            Err(_) => warn!("Transcription socket did not close in time"),
        }
    }

    worker.abort();
    println!("Finished");
    Ok(())
}
