//! Log streaming command.

use anyhow::{Context, Result, bail};
use duci_core::LogLine;

use super::run::format_line;

/// Follow a job's log until the job finishes.
pub async fn follow(server: &str, id: &str) -> Result<()> {
    let url = format!("{}/logs/{}", server.trim_end_matches('/'), id);
    let mut response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        bail!("Failed to fetch logs ({}): {}", status, text);
    }

    let mut buffer = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        for line in drain_lines(&mut buffer, &chunk) {
            print_line(&line)?;
        }
    }
    if !buffer.is_empty() {
        print_line(&String::from_utf8_lossy(&buffer))?;
    }
    Ok(())
}

fn print_line(raw: &str) -> Result<()> {
    let line: LogLine = serde_json::from_str(raw).context("Invalid log line")?;
    println!("{}", format_line(&line));
    Ok(())
}

/// Append `chunk` to `buffer` and take out every complete line.
fn drain_lines(buffer: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    buffer.extend_from_slice(chunk);

    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line[..pos]).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}
