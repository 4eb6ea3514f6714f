// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

//! Coderelay server entrypoint.
//!
//! By default this serves MCP over streamable HTTP at
//! `http://127.0.0.1:<port>/mcp`.
//!
//! Use `--mcp` to serve over stdio instead (intended for tool integrations).

use std::error::Error;
use std::sync::Arc;

use axum::Router;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};

use coderelay::graph::MemoryGraph;
use coderelay::mcp::CoderelayMcp;

const DEFAULT_HTTP_PORT: u16 = 27460;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--http-port <port>]\n  {program} --mcp\n\nHTTP mode (default) serves MCP over streamable HTTP at `http://127.0.0.1:<port>/mcp`.\n--http-port selects the port (0 = ephemeral; default {DEFAULT_HTTP_PORT}).\n\n--mcp serves MCP over stdio and cannot be combined with --http-port."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    mcp: bool,
    http_port: Option<u16>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mcp" => {
                if options.mcp {
                    return Err(());
                }
                options.mcp = true;
            }
            "--http-port" => {
                if options.http_port.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let port: u16 = raw.parse().map_err(|_| ())?;
                options.http_port = Some(port);
            }
            _ => return Err(()),
        }
    }

    if options.mcp && options.http_port.is_some() {
        return Err(());
    }

    Ok(options)
}

fn init_tracing(stdio_mode: bool) {
    // Stdio mode carries the MCP wire protocol on stdout, so logs must stay
    // on stderr either way.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if stdio_mode {
        let _ = builder.with_ansi(false).try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "coderelay".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        init_tracing(options.mcp);
        let mcp = CoderelayMcp::new(Arc::new(MemoryGraph::new()));

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        if options.mcp {
            runtime.block_on(mcp.serve_stdio())?;
            return Ok(());
        }

        let http_port = options.http_port.unwrap_or(DEFAULT_HTTP_PORT);
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", http_port)).await?;
            tracing::info!(addr = %listener.local_addr()?, "serving MCP over streamable HTTP");

            let config = StreamableHttpServerConfig {
                stateful_mode: true,
                ..StreamableHttpServerConfig::default()
            };
            let shutdown_token = config.cancellation_token.clone();

            let session_manager = Arc::new(LocalSessionManager::default());
            let mcp_service = {
                let mcp = mcp.clone();
                StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, config)
            };

            let router = Router::new().nest_service("/mcp", mcp_service);
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            });
            serve.await?;
            Ok::<(), Box<dyn Error>>(())
        })?;

        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("coderelay: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_options, CliOptions};

    #[test]
    fn parses_empty_args() {
        let options = parse_options(std::iter::empty()).expect("parse options");
        assert_eq!(options, CliOptions::default());
    }

    #[test]
    fn parses_mcp_flag() {
        let options = parse_options(["--mcp".to_owned()].into_iter()).expect("parse options");
        assert!(options.mcp);
        assert_eq!(options.http_port, None);
    }

    #[test]
    fn parses_http_port() {
        let options = parse_options(["--http-port".to_owned(), "1234".to_owned()].into_iter())
            .expect("parse options");
        assert_eq!(options.http_port, Some(1234));
        assert!(!options.mcp);
    }

    #[test]
    fn rejects_http_port_with_stdio_mode() {
        parse_options(["--mcp".to_owned(), "--http-port".to_owned(), "0".to_owned()].into_iter())
            .unwrap_err();
    }

    #[test]
    fn rejects_unknown_args() {
        parse_options(["--nope".to_owned()].into_iter()).unwrap_err();
    }

    #[test]
    fn rejects_duplicate_flags() {
        parse_options(["--mcp".to_owned(), "--mcp".to_owned()].into_iter()).unwrap_err();

        parse_options(
            ["--http-port".to_owned(), "1".to_owned(), "--http-port".to_owned(), "2".to_owned()]
                .into_iter(),
        )
        .unwrap_err();
    }

    #[test]
    fn rejects_missing_port_value() {
        parse_options(["--http-port".to_owned()].into_iter()).unwrap_err();
    }

    #[test]
    fn rejects_non_numeric_port() {
        parse_options(["--http-port".to_owned(), "abc".to_owned()].into_iter()).unwrap_err();
    }
}
