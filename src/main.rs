//! CLI de StripClean: analiza y limpia metadata de imágenes desde la terminal.

mod app;
mod formatting;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stripclean::logging;
use stripclean::report::export::ExportFormat;

#[derive(Parser)]
#[command(name = "stripclean")]
#[command(version)]
#[command(about = "Analiza y elimina la metadata de imágenes JPEG, PNG, TIFF y WebP")]
struct Cli {
    /// Archivo TOML con límites y ajustes de riesgo
    #[arg(short, long, env = "STRIPCLEAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Registro detallado
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Muestra la metadata de una o varias imágenes
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Imprime el reporte en JSON
        #[arg(long)]
        json: bool,

        /// Exporta el reporte (json o txt)
        #[arg(long, requires = "output")]
        export: Option<String>,

        /// Ruta del reporte exportado
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Escribe una copia de la imagen sin metadata
    Clean {
        file: PathBuf,

        /// Ruta de salida; por defecto se reemplaza el original
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Etiqueta EXIF a conservar (repetible), p. ej. Orientation
        #[arg(short, long = "keep")]
        keep: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let engine = app::build_engine(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            files,
            json,
            export,
            output,
        } => {
            let export = match (export, output) {
                (Some(format), Some(path)) => Some((format.parse::<ExportFormat>()?, path)),
                _ => None,
            };
            app::analyze(&engine, &files, json, export)
        }
        Command::Clean { file, output, keep } => app::clean(&engine, &file, output, keep),
    }
}
