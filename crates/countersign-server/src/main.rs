/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

use anyhow::Result;
use clap::{Parser, Subcommand};
use countersign_server::logging::init_logging;
use countersign_server::{serve, ConfigLoader};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "countersign-server", version, about = "Delegated document signing API")]
struct Cli {
    /// Configuration file (defaults to the search path)
    #[arg(short, long, global = true, env = "COUNTERSIGN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Overrides `http.bind`
        #[arg(long, env = "COUNTERSIGN_BIND")]
        bind: Option<SocketAddr>,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new();
    let config = loader.load_config(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Serve { bind } => {
            init_logging(&config.logging)?;
            serve(config, bind).await?;
        }
        Commands::CheckConfig => {
            println!(
                "Configuration OK: bind {}, backend {}, documents {}",
                config.http.bind,
                match &config.signing.backend {
                    Some(countersign_server::config::BackendConfig::Pkcs12 { .. }) => "pkcs12",
                    Some(countersign_server::config::BackendConfig::Hsm { .. }) => "hsm",
                    None => "none",
                },
                config.documents.root.display()
            );
        }
    }

    Ok(())
}
