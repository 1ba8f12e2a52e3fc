use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley::dialogue::SessionSummary;
use parley::voice::{
    AudioCapture, AudioPlayback, DeviceRecognitionEngine, DeviceSynthesisEngine, PlaybackEvent,
    SpeechCapture, SpeechPlayback, StopSignal, TextToSpeech, Voice, select_voice,
};
use parley::{
    Config, CredentialProvider, DialogueController, DialogueEvent, HttpSessionStore,
    HttpTurnClient, SaveStatus, Services, Session, StaticCredentials,
};

/// Parley - spoken dialogue practice with a language tutor
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Practice language as a BCP 47 tag (e.g. "fr-FR")
    #[arg(short, long)]
    language: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Text only: no microphone or speaker
    #[arg(long)]
    no_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// List saved sessions
    Sessions,
    /// Print a saved session's transcript
    Show {
        /// Session id from `parley sessions`
        session_id: String,
    },
    /// Continue a saved session
    Resume {
        /// Session id from `parley sessions`
        session_id: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Bonjour! Ceci est un test de synthèse vocale.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,parley=warn",
        1 => "warn,parley=info",
        2 => "info,parley=debug",
        _ => "trace",
    };

    // stdout belongs to the conversation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(language) = cli.language {
        config.dialogue.language = language;
    }
    if cli.no_voice {
        config.voice.enabled = false;
    }
    tracing::debug!(?config, "loaded configuration");

    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(StaticCredentials::from_config(&config.credentials));

    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&config, &text).await,
        Some(Command::Sessions) => {
            let services = build_services(&config, credentials)?;
            list_sessions(&services).await
        }
        Some(Command::Show { session_id }) => {
            let services = build_services(&config, credentials)?;
            let session = services.store.get_session(&session_id).await?;
            print_session(&session);
            Ok(())
        }
        Some(Command::Resume { session_id }) => {
            let services = build_services(&config, credentials)?;
            let session = services.store.get_session(&session_id).await?;
            let dialogue = build_controller(&config, services);
            chat(dialogue, Some(session)).await
        }
        None => {
            let services = build_services(&config, credentials)?;
            let dialogue = build_controller(&config, services);
            chat(dialogue, None).await
        }
    }
}

fn build_services(
    config: &Config,
    credentials: Arc<dyn CredentialProvider>,
) -> anyhow::Result<Services> {
    let turns = HttpTurnClient::new(&config.api.base_url, Arc::clone(&credentials))?;
    let store = HttpSessionStore::new(
        &config.api.base_url,
        config.api.request_timeout(),
        Arc::clone(&credentials),
    )?;

    Ok(Services {
        turns: Arc::new(turns),
        store: Arc::new(store),
        credentials,
    })
}

fn build_controller(config: &Config, services: Services) -> DialogueController {
    let mut dialogue = DialogueController::new(
        services,
        config.dialogue.clone(),
        config.api.turn_timeout(),
    );

    if !config.voice.enabled {
        tracing::info!("voice disabled; text only");
        return dialogue;
    }
    let Some(key) = config.speech_api_key.as_ref() else {
        tracing::warn!("OPENAI_API_KEY not set; voice disabled");
        return dialogue;
    };

    match DeviceRecognitionEngine::from_config(&config.voice, clone_secret(key)) {
        Ok(engine) => {
            dialogue = dialogue.with_capture(SpeechCapture::new(
                Arc::new(engine),
                config.dialogue.language.clone(),
            ));
        }
        Err(e) => tracing::warn!(error = %e, "speech input unavailable"),
    }

    match DeviceSynthesisEngine::from_config(&config.voice, clone_secret(key)) {
        Ok(engine) => {
            let (playback, events) =
                SpeechPlayback::new(Arc::new(engine), config.voice.catalog_wait());
            dialogue = dialogue.with_playback(playback, events);
        }
        Err(e) => tracing::warn!(error = %e, "speech output unavailable"),
    }

    dialogue
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

/// Interactive dialogue in the terminal
async fn chat(mut dialogue: DialogueController, resume: Option<Session>) -> anyhow::Result<()> {
    println!("Parley - type to talk, /help for commands\n");

    match resume {
        Some(session) => {
            dialogue.resume(&session)?;
            print_session(&session);
        }
        None => dialogue.start()?,
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut speech_warned = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/help" => print_help(),
                    "/quit" => return Ok(()),
                    "/end" => break,
                    "/listen" => match dialogue.start_listening() {
                        Ok(()) => println!("(listening... /stop when done)"),
                        Err(e) => println!("! {e}"),
                    },
                    "/stop" => dialogue.stop_listening(),
                    "/send" => {
                        if let Err(e) = dialogue.submit_input() {
                            println!("! {e}");
                        }
                    }
                    "/save" => match dialogue.save().await {
                        Ok(status) => println!("({status})"),
                        Err(e) => println!("! {e}"),
                    },
                    text => match dialogue.submit(text) {
                        Ok(_) => {}
                        Err(parley::Error::Busy(_)) => println!("(still waiting for the tutor)"),
                        Err(e) => println!("! {e}"),
                    },
                }
            }
            Some(event) = dialogue.next_event() => {
                render(&dialogue, event, &mut speech_warned);
            }
        }
    }

    let outcome = dialogue.end_session().await?;
    match outcome.save {
        SaveStatus::Saved { session_id } => {
            println!("\nSession saved ({} messages): {session_id}", outcome.message_count);
        }
        SaveStatus::Failed { reason } => println!("\nSession could not be saved: {reason}"),
        SaveStatus::Skipped => println!("\nNothing to save."),
    }
    Ok(())
}

fn render(dialogue: &DialogueController, event: DialogueEvent, speech_warned: &mut bool) {
    match event {
        DialogueEvent::Opened { message, .. } | DialogueEvent::Replied { message } => {
            println!("tutor: {}", message.text);
            if !dialogue.suggested_words().is_empty() {
                println!("       words: {}", dialogue.suggested_words().join(", "));
            }
            print_progress(dialogue);
        }
        DialogueEvent::TurnFailed { message, .. } => {
            println!("tutor: {}", message.text);
            if let Some(error) = dialogue.error() {
                println!("! {error}");
            }
        }
        DialogueEvent::Heard { text, submitted } => {
            println!("you (spoken): {text}");
            if !submitted {
                println!("(/send to submit)");
            }
        }
        DialogueEvent::NoSpeech => println!("(no speech detected)"),
        DialogueEvent::CaptureFailed { error } => println!("! {error}"),
        DialogueEvent::CaptureCancelled => {}
        DialogueEvent::Playback(PlaybackEvent::Failed { error, .. }) => {
            if !*speech_warned {
                println!("(speech output: {error})");
                *speech_warned = true;
            }
        }
        DialogueEvent::Playback(_) => {}
    }
}

fn print_progress(dialogue: &DialogueController) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (dialogue.progress() * 100.0).round() as u32;
    println!("       [{percent:>3}% of the exchange goal]");
}

fn print_help() {
    println!("  <text>    say something");
    println!("  /listen   speak instead of typing");
    println!("  /stop     finish speaking");
    println!("  /send     submit recognized speech");
    println!("  /save     save a snapshot of the session");
    println!("  /end      save and leave");
    println!("  /quit     leave without saving");
}

async fn list_sessions(services: &Services) -> anyhow::Result<()> {
    let identity = services.credentials.require().await?;
    let sessions = services.store.list_sessions(&identity.user_id).await?;

    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }

    for SessionSummary {
        session_id,
        started_at,
        message_count,
        ..
    } in sessions
    {
        println!(
            "{session_id}  {}  {message_count} messages",
            started_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn print_session(session: &Session) {
    let summary = SessionSummary::of(session);
    println!(
        "Session {} ({} messages, {} - {})\n",
        summary.session_id,
        summary.message_count,
        summary.started_at.format("%Y-%m-%d %H:%M"),
        summary.ended_at.format("%H:%M"),
    );
    for message in &session.messages {
        let who = match message.sender {
            parley::Sender::User => "you",
            parley::Sender::Assistant => "tutor",
        };
        println!("{who}: {}", message.text);
    }
    println!();
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    // 2 seconds of 440Hz sine wave at 24kHz
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    tokio::task::spawn_blocking(move || playback.play_blocking(samples, &StopSignal::new()))
        .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output through the configured speech endpoint
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let key = config
        .speech_api_key
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is required for TTS"))?;

    let tts = TextToSpeech::new(
        &config.voice.tts_url,
        clone_secret(key),
        config.voice.tts_model.clone(),
        config.voice.tts_speed,
    )?;

    let voices: Vec<Voice> = config
        .voice
        .voices
        .iter()
        .map(|v| Voice {
            id: v.id.clone(),
            language: v.language.clone(),
        })
        .collect();
    let voice = select_voice(&voices, &config.dialogue.language)
        .map_or_else(|| config.voice.default_voice.clone(), |v| v.id);

    println!("Synthesizing speech with voice \"{voice}\"...");
    let mp3_data = tts.synthesize(text, &voice).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    tokio::task::spawn_blocking(move || playback.play_mp3_blocking(&mp3_data, &StopSignal::new()))
        .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
