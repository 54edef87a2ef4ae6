use clap::Parser;
use tokio::net::TcpStream;

use callout_buffering::net::frame::{write_frame, FrameReader, InboundFrame, OutboundFrame};
use callout_buffering::protocol::{HttpBody, HttpHeaders, HttpTrailers, PhaseMessage};

#[derive(Parser)]
#[command(name = "callout-client")]
#[command(about = "Replay one scripted transaction against a callout server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Request body chunk; repeat for multiple chunks.
    #[arg(short, long = "body")]
    bodies: Vec<String>,

    /// Value for the x-request-id header.
    #[arg(long)]
    request_id: Option<String>,

    /// Finish the request body with trailers instead of end_of_stream.
    #[arg(long)]
    trailers: bool,

    /// Send response headers before the final body chunk.
    #[arg(long)]
    response_headers_first: bool,

    /// Stream number to use on the connection.
    #[arg(long, default_value_t = 1)]
    stream: u64,

    #[arg(long, default_value = "/")]
    path: String,
}

fn script(cli: &Cli) -> Vec<PhaseMessage> {
    let mut pairs = vec![
        (":method".to_string(), "POST".to_string()),
        (":path".to_string(), cli.path.clone()),
    ];
    if let Some(id) = &cli.request_id {
        pairs.push(("x-request-id".to_string(), id.clone()));
    }
    let mut request_headers = HttpHeaders::from_pairs(pairs);
    request_headers.end_of_stream = cli.bodies.is_empty() && !cli.trailers;

    let response_headers =
        PhaseMessage::ResponseHeaders(HttpHeaders::from_pairs([(":status", "200")]));

    let mut messages = vec![PhaseMessage::RequestHeaders(request_headers)];
    let last = cli.bodies.len().saturating_sub(1);
    for (i, chunk) in cli.bodies.iter().enumerate() {
        if i == last && cli.response_headers_first {
            messages.push(response_headers.clone());
        }
        let eos = i == last && !cli.trailers;
        messages.push(PhaseMessage::RequestBody(HttpBody::chunk(chunk.as_bytes(), eos)));
    }
    if cli.trailers {
        messages.push(PhaseMessage::RequestTrailers(HttpTrailers::default()));
    }
    if !(cli.response_headers_first && !cli.bodies.is_empty()) {
        messages.push(response_headers);
    }
    messages
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let messages = script(&cli);
    let expected = messages.len();

    let stream = TcpStream::connect(&cli.addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    for message in messages {
        write_frame(
            &mut write_half,
            &InboundFrame::Message {
                stream: cli.stream,
                message,
            },
        )
        .await?;
    }

    let mut reader = FrameReader::new(read_half, 16 * 1024 * 1024);
    let mut received = 0;
    while received < expected {
        let Some(frame) = reader.next::<OutboundFrame>().await? else {
            eprintln!("Error: server closed the connection after {received} responses");
            break;
        };
        println!("{}", serde_json::to_string_pretty(&frame)?);
        match frame {
            OutboundFrame::Response { .. } => received += 1,
            OutboundFrame::Error { message, .. } => {
                eprintln!("Error: {message}");
                break;
            }
        }
    }

    write_frame(&mut write_half, &InboundFrame::End { stream: cli.stream }).await?;
    Ok(())
}
