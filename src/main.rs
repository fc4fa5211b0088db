use std::cell::RefCell;
use std::io::Write as _;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sarathi::voice::mic::MicInput;
use sarathi::{
    Config, CpalSink, CredentialResolver, Language, MicRecognizer, PlaybackState, SpeechPlayback,
    SpeechSynthesis, SpeechToText, StreamingGenerator, VoiceCapture,
};

/// Sarathi - ask a question by voice or text, hear the answer back
#[derive(Parser)]
#[command(name = "sarathi", version, about)]
struct Cli {
    /// Interface language tag (en, hi, ta)
    #[arg(short, long, env = "SARATHI_LANGUAGE")]
    language: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question and stream the answer to stdout
    Ask {
        /// The question to ask
        prompt: String,
        /// Speak the answer after streaming it
        #[arg(long)]
        speak: bool,
    },
    /// Capture one spoken question, then answer it
    Listen {
        /// Speak the answer after streaming it
        #[arg(long)]
        speak: bool,
    },
    /// Synthesize and play the given text
    Speak {
        /// Text to speak
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,sarathi=info",
        1 => "info,sarathi=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Wiring for one session: credentials plus the three pipeline components'
/// backends, built from configuration.
struct Session {
    generator: StreamingGenerator,
    synthesis: SpeechSynthesis,
    stt: Arc<SpeechToText>,
    language: Language,
}

impl Session {
    fn from_config(config: &Config, language_override: Option<&str>) -> Self {
        let credentials = Arc::new(match &config.backend.session_token {
            Some(token) => {
                CredentialResolver::with_session(config.backend.anon_key.clone(), token.clone())
            }
            None => CredentialResolver::new(config.backend.anon_key.clone()),
        });

        let language = language_override
            .map(|tag| tag.parse().unwrap_or_default())
            .unwrap_or(config.language);

        Self {
            generator: StreamingGenerator::new(
                config.backend.generate_url(),
                Arc::clone(&credentials),
            ),
            synthesis: SpeechSynthesis::new(
                config.backend.synthesize_url(),
                config.voice.voice_id.clone(),
                Arc::clone(&credentials),
            ),
            stt: Arc::new(SpeechToText::new(
                config.backend.transcribe_url(),
                credentials,
            )),
            language,
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::TestMic { duration }) = &cli.command {
        return test_mic(*duration).await;
    }

    let config = Config::load()?;
    let session = Session::from_config(&config, cli.language.as_deref());

    match cli.command {
        Some(Command::Ask { prompt, speak }) => {
            let answer = stream_answer(&session.generator, &prompt).await?;
            if speak {
                if let Some(answer) = answer {
                    speak_text(&session.synthesis, &answer).await?;
                }
            }
        }
        Some(Command::Listen { speak }) => {
            let Some(transcript) = capture_utterance(&session).await? else {
                println!("No speech captured.");
                return Ok(());
            };
            println!("You said: {transcript}\n");

            let answer = stream_answer(&session.generator, &transcript).await?;
            if speak {
                if let Some(answer) = answer {
                    speak_text(&session.synthesis, &answer).await?;
                }
            }
        }
        Some(Command::Speak { text }) => {
            speak_text(&session.synthesis, &text).await?;
        }
        Some(Command::TestMic { .. }) => unreachable!("handled above"),
        None => interactive(&session).await?,
    }

    Ok(())
}

/// Stream one answer to stdout; ctrl-c cancels without surfacing an error.
///
/// Returns the final answer text, or `None` when cancelled.
async fn stream_answer(
    generator: &StreamingGenerator,
    prompt: &str,
) -> anyhow::Result<Option<String>> {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    // The consumer receives the full accumulated text every chunk; the
    // terminal only needs the new suffix.
    let mut printed = 0usize;
    let result = generator
        .generate(
            prompt,
            |text| {
                print!("{}", &text[printed..]);
                printed = text.len();
                let _ = std::io::stdout().flush();
            },
            &cancel,
        )
        .await;

    println!();
    match result {
        Ok(answer) => Ok(Some(answer)),
        Err(e) if e.is_cancellation() => {
            tracing::debug!("generation cancelled by user");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Capture one utterance from the microphone and return its transcript
async fn capture_utterance(session: &Session) -> anyhow::Result<Option<String>> {
    let recognizer = MicRecognizer::new(Arc::clone(&session.stt));

    let transcript: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let transcript_slot = Rc::clone(&transcript);
    let failed = Rc::new(RefCell::new(false));
    let failed_slot = Rc::clone(&failed);

    let mut capture = VoiceCapture::new(Box::new(recognizer))
        .on_transcript(move |text| {
            *transcript_slot.borrow_mut() = Some(text);
        })
        .on_error(move |message| {
            eprintln!("Recognition failed: {message}");
            *failed_slot.borrow_mut() = true;
        });

    if !capture.is_supported() {
        println!("No microphone available.");
        return Ok(None);
    }

    println!("Listening... speak now (ctrl-c to cancel)");
    capture.start(session.language);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                capture.abort();
                return Ok(None);
            }
            () = tokio::time::sleep(Duration::from_millis(100)) => {
                capture.pump();
                if transcript.borrow().is_some() || *failed.borrow() {
                    break;
                }
            }
        }
    }

    let text = transcript.borrow_mut().take();
    Ok(text)
}

/// Speak `text`, waiting for natural completion; ctrl-c cancels the fetch
/// or stops playback, whichever is in progress.
async fn speak_text(synthesis: &SpeechSynthesis, text: &str) -> anyhow::Result<()> {
    let sink = CpalSink::new()?;
    let mut playback = SpeechPlayback::new(synthesis.clone(), sink)
        .on_failure(|e| eprintln!("Playback failed: {e}"));

    playback.toggle(text);

    while !matches!(playback.state(), PlaybackState::Idle) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                playback.stop();
            }
            () = tokio::time::sleep(Duration::from_millis(100)) => {
                playback.poll();
            }
        }
    }

    Ok(())
}

/// Interactive loop: typed prompts (or `:listen`), streamed answers,
/// `:speak` to hear the last answer.
async fn interactive(session: &Session) -> anyhow::Result<()> {
    println!("sarathi - ask anything. :listen for voice, :speak to hear the last answer, :quit to exit.");

    let stdin = std::io::stdin();
    let mut last_answer: Option<String> = None;

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => {}
            ":quit" | ":q" => break,
            ":speak" => match &last_answer {
                Some(answer) => speak_text(&session.synthesis, answer).await?,
                None => println!("Nothing to speak yet."),
            },
            ":listen" => {
                if let Some(transcript) = capture_utterance(session).await? {
                    println!("You said: {transcript}\n");
                    if let Some(answer) =
                        stream_answer(&session.generator, &transcript).await?
                    {
                        last_answer = Some(answer);
                    }
                }
            }
            prompt => {
                if let Some(answer) = stream_answer(&session.generator, prompt).await? {
                    last_answer = Some(answer);
                }
            }
        }
    }

    Ok(())
}

/// Test microphone input with an RMS meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = MicInput::new()?;
    mic.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = mic.take_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    mic.stop();

    println!("\nIf the meter moved, your microphone is working.");
    Ok(())
}

/// RMS energy of samples
#[allow(clippy::cast_precision_loss)]
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
