//! # Voice Flow - Manual End-to-End Client
//!
//! Drives a running server through the whole patient interaction:
//! 1. Gets a transcript of a recorded WAV, either streamed over
//!    `/ws/stream_stt` (`--mode stream`) or uploaded to `/transcribe`
//!    (`--mode upload`)
//! 2. Sends the transcript to `/api/get_intent`
//! 3. Builds the spoken reply and renders it through `/api/synthesize`
//! 4. Writes the reply audio to disk
//!
//! The input must be mono 16-bit PCM. Streaming also requires the rate the
//! server is told to expect.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use clinic_voice_backend::audio::pcm::samples_to_le_bytes;
use clinic_voice_backend::audio::wav::{decode_mono16, PcmClip};
use clinic_voice_backend::gemini::ClinicIntent;
use clinic_voice_backend::transcription::TranscriptMessage;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const APOLOGY: &str = "Üzgünüm, şikayetinizi tam olarak anlayamadım. Lütfen daha detaylı anlatır mısınız?";

/// Deadline for each REST call.
const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Stream PCM chunks over the WebSocket
    Stream,
    /// Upload the whole file to /transcribe
    Upload,
}

#[derive(Parser, Debug)]
#[command(name = "voice-flow", about = "Run one spoken request through the clinic voice backend")]
struct Args {
    /// Base URL of the running server
    #[arg(long, env = "VOICE_FLOW_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// How the recording reaches the recognizer
    #[arg(long, value_enum, default_value_t = Mode::Stream)]
    mode: Mode,

    /// Recorded request: mono 16-bit PCM WAV
    #[arg(long, short)]
    input: PathBuf,

    /// Where the spoken reply is written [default: response_realtime.wav, or response.wav when uploading]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Prebuilt voice for the reply
    #[arg(long, default_value = "Kore")]
    voice: String,

    /// Sample rate the input must have when streaming
    #[arg(long, default_value_t = 16000)]
    sample_rate: u32,

    /// Bytes of PCM per WebSocket frame
    #[arg(long, default_value_t = 4000)]
    chunk_size: usize,

    /// Seconds to wait for the last transcript after end-of-stream
    #[arg(long, default_value_t = 10)]
    final_timeout: u64,
}

impl Args {
    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| match self.mode {
            Mode::Stream => PathBuf::from("response_realtime.wav"),
            Mode::Upload => PathBuf::from("response.wav"),
        })
    }
}

/// Body of a `/transcribe` response.
#[derive(Debug, Deserialize)]
struct Transcription {
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "voice_flow=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    let args = Args::parse();
    if args.chunk_size == 0 || args.chunk_size % 2 != 0 {
        bail!("--chunk-size must be a positive even number of bytes");
    }

    let bytes = std::fs::read(&args.input).with_context(|| format!("Recording not found: {}", args.input.display()))?;
    let clip = load_recording(&args.input, &bytes)?;
    info!(
        input = %args.input.display(),
        sample_rate = clip.sample_rate,
        seconds = clip.duration_seconds(),
        mode = ?args.mode,
        "Loaded recording"
    );

    let http = reqwest::Client::new();
    let base = args.server.trim_end_matches('/');

    let transcript = match args.mode {
        Mode::Stream => {
            if clip.sample_rate != args.sample_rate {
                bail!(
                    "Recording is {} Hz but {} Hz is expected (ffmpeg -i in.wav -ar {} -ac 1 -c:a pcm_s16le out.wav)",
                    clip.sample_rate,
                    args.sample_rate,
                    args.sample_rate
                );
            }
            stream_transcript(&args, &samples_to_le_bytes(&clip.samples)).await?
        }
        Mode::Upload => upload_transcript(&http, base, &args.input, bytes).await?,
    };
    if transcript.is_empty() {
        bail!("Server returned no transcript for {}", args.input.display());
    }
    info!(transcript = %transcript, "Final transcript");

    let intent: ClinicIntent = post_json(&http, &format!("{}/api/get_intent", base), &json!({ "text": transcript }))
        .await?
        .json()
        .await
        .context("Intent response was not the expected JSON")?;
    info!(
        poliklinik = %intent.poliklinik,
        aciliyet = intent.aciliyet.as_str(),
        sebep_ozeti = %intent.sebep_ozeti,
        "Intent classified"
    );

    let reply = build_reply(&intent);
    info!(reply = %reply, "Reply sentence");

    let audio = post_json(
        &http,
        &format!("{}/api/synthesize", base),
        &json!({ "text": reply, "voice": args.voice }),
    )
    .await?
    .bytes()
    .await
    .context("Failed to read synthesized audio")?;

    let output = args.output_path();
    std::fs::write(&output, &audio).with_context(|| format!("Failed to write {}", output.display()))?;
    info!(output = %output.display(), bytes = audio.len(), "Reply audio saved");

    Ok(())
}

/// Check the recording is a mono 16-bit WAV before anything is sent.
fn load_recording(path: &Path, bytes: &[u8]) -> Result<PcmClip> {
    decode_mono16(bytes).with_context(|| format!("{} is not usable", path.display()))
}

/// `http(s)://host` becomes `ws(s)://host/ws/stream_stt?sample_rate=N`.
fn stream_url(server: &str, sample_rate: u32) -> Result<String> {
    let server = server.trim_end_matches('/');
    let ws_base = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(anyhow!("Server URL must start with http:// or https://, got {}", server));
    };

    Ok(format!("{}/ws/stream_stt?sample_rate={}", ws_base, sample_rate))
}

/// Stream the PCM, signal end-of-stream and collect every final transcript.
async fn stream_transcript(args: &Args, pcm: &[u8]) -> Result<String> {
    let url = stream_url(&args.server, args.sample_rate)?;
    info!(url = %url, "Connecting");

    let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("WebSocket connection to {} failed", url))?;
    let (mut sink, mut stream) = socket.split();

    let reader = tokio::spawn(async move {
        let mut finals = Vec::new();
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<TranscriptMessage>(&text) {
                    Ok(msg) if msg.is_final() => {
                        info!(text = %msg.text, "Final segment");
                        finals.push(msg.text);
                    }
                    Ok(msg) => debug!(text = %msg.text, "Partial"),
                    Err(e) => warn!("Unexpected message {:?}: {}", text, e),
                },
                Ok(Message::Close(frame)) => {
                    if let Some(frame) = frame {
                        if frame.code != CloseCode::Normal {
                            return Err(anyhow!("Server closed the stream: {} {}", frame.code, frame.reason));
                        }
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(anyhow!("WebSocket read failed: {}", e)),
            }
        }
        Ok(finals)
    });

    for chunk in pcm.chunks(args.chunk_size) {
        sink.send(Message::Binary(chunk.to_vec())).await.context("Failed to send audio")?;
    }
    sink.send(Message::Text(r#"{"eof" : 1}"#.to_string()))
        .await
        .context("Failed to send end-of-stream")?;
    sink.send(Message::Close(None)).await.context("Failed to close stream")?;

    let finals = tokio::time::timeout(Duration::from_secs(args.final_timeout), reader)
        .await
        .map_err(|_| anyhow!("No reply within {}s of end-of-stream", args.final_timeout))?
        .context("Reader task failed")??;

    Ok(join_finals(&finals))
}

fn join_finals(finals: &[String]) -> String {
    finals
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// POST the whole file as multipart field `file` and return the transcript.
async fn upload_transcript(http: &reqwest::Client, base: &str, path: &Path, bytes: Vec<u8>) -> Result<String> {
    let url = format!("{}/transcribe", base);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording.wav")
        .to_string();

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("audio/wav")?;
    let form = reqwest::multipart::Form::new().part("file", part);

    info!(url = %url, "Uploading recording");
    let response = http
        .post(&url)
        .timeout(HTTP_TIMEOUT)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("{} is unreachable", url))?;

    let transcription: Transcription = check_status(&url, response)
        .await?
        .json()
        .await
        .context("Transcription response was not the expected JSON")?;

    Ok(transcription.text.trim().to_string())
}

async fn post_json(http: &reqwest::Client, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
    let response = http
        .post(url)
        .timeout(HTTP_TIMEOUT)
        .json(body)
        .send()
        .await
        .with_context(|| format!("{} is unreachable", url))?;

    check_status(url, response).await
}

async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} answered {}: {}", url, status, body);
    }

    Ok(response)
}

/// The sentence spoken back to the patient.
fn build_reply(intent: &ClinicIntent) -> String {
    if intent.is_undetermined() {
        return APOLOGY.to_string();
    }

    format!(
        "Anladım. '{}' şikayetiniz için sizi {} polikliniğine yönlendiriyorum.",
        intent.sebep_ozeti,
        intent.poliklinik.trim()
    )
}
