#![forbid(unsafe_code)]

use super::framing::{
    TransportMode, detect_mode_from_first_line, parse_request, read_content_length_frame,
    write_frame,
};
use crate::McpServer;
use std::io::{BufRead, BufReader, Write};

/// Serves requests until stdin closes. The framing is detected once from the first non-empty
/// line and used for every response after it.
pub(crate) fn run_stdio(server: &mut McpServer) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();
    serve(server, &mut reader, &mut stdout)
}

fn serve<R: BufRead, W: Write>(
    server: &mut McpServer,
    reader: &mut R,
    writer: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mode: Option<TransportMode> = None;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            server.session.note_exit("stdin closed");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let current = match mode {
            Some(current) => current,
            None => {
                let Some(detected) = detect_mode_from_first_line(&line) else {
                    server.session.note_error("unrecognized framing before first request");
                    continue;
                };
                server.session.note_mode(detected.as_str());
                tracing::debug!(mode = detected.as_str(), "transport detected");
                mode = Some(detected);
                detected
            }
        };

        let body = match current {
            TransportMode::NewlineJson => line.trim().as_bytes().to_vec(),
            TransportMode::ContentLength => match read_content_length_frame(reader, line) {
                Ok(Some(body)) => body,
                Ok(None) => {
                    server.session.note_exit("stdin closed mid-frame");
                    break;
                }
                Err(err) => {
                    server.session.note_error(&err.to_string());
                    server.session.note_exit("framing error");
                    return Err(err.into());
                }
            },
        };

        let response = match parse_request(&body) {
            Ok(request) => {
                server.session.note_request(&request.method);
                server.handle(request)
            }
            Err(error_response) => Some(error_response),
        };
        if let Some(response) = response {
            if let Some(message) = response
                .get("error")
                .and_then(|err| err.get("message"))
                .and_then(|msg| msg.as_str())
            {
                server.session.note_error(message);
            }
            write_frame(writer, current, &response)?;
        }
    }

    Ok(())
}
