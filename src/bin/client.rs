use argh::FromArgs;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::json;
use std::path::Path;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Client for the vision relay endpoints
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Analyze(AnalyzeCommand),
    ExtractText(ExtractTextCommand),
    AnalyzeMath(AnalyzeMathCommand),
}

#[derive(FromArgs)]
/// Analyze one or more images with a prompt
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {
    /// image URL or local .jpg/.jpeg/.png path, repeatable
    #[argh(option, short = 'i')]
    image: Vec<String>,

    /// the prompt to use
    #[argh(option, short = 'p')]
    prompt: String,

    /// sampling temperature forwarded to the model
    #[argh(option)]
    temperature: Option<f64>,
}

#[derive(FromArgs)]
/// Extract the text in an image
#[argh(subcommand, name = "extract-text")]
struct ExtractTextCommand {
    /// image URL or local .jpg/.jpeg/.png path
    #[argh(option, short = 'i')]
    image: String,
}

#[derive(FromArgs)]
/// Analyze a math problem in an image
#[argh(subcommand, name = "analyze-math")]
struct AnalyzeMathCommand {
    /// image URL or local .jpg/.jpeg/.png path
    #[argh(option, short = 'i')]
    image: String,
}

// URLs are sent as-is, local files are inlined as data URIs
fn read_image(image: &str) -> Result<String, Box<dyn std::error::Error>> {
    if image.starts_with("http://") || image.starts_with("https://") {
        return Ok(image.to_string());
    }

    let path = Path::new(image);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or("Invalid file extension")?;

    let mime = match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        other => return Err(format!("Unsupported image format: {other}").into()),
    };

    let bytes = std::fs::read(path)?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("http://{}:{}/api/vision", args.host, args.port);

    let (endpoint, body) = match args.command {
        ClientCommands::Analyze(cmd) => {
            let images = cmd
                .image
                .iter()
                .map(|image| read_image(image))
                .collect::<Result<Vec<_>, _>>()?;
            let options = match cmd.temperature {
                Some(temperature) => json!({ "temperature": temperature }),
                None => json!({}),
            };
            (
                "analyze",
                json!({ "image": images, "prompt": cmd.prompt, "options": options }),
            )
        }
        ClientCommands::ExtractText(cmd) => {
            ("extract-text", json!({ "image": read_image(&cmd.image)? }))
        }
        ClientCommands::AnalyzeMath(cmd) => {
            ("analyze-math", json!({ "image": read_image(&cmd.image)? }))
        }
    };

    let response = client
        .post(format!("{addr}/{endpoint}"))
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("Status: {status}");
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
