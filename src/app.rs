//! Órdenes de la CLI sobre archivos: análisis, exportación y limpieza.

use crate::ui;
use anyhow::{Context, Result, bail};
use console::style;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use stripclean::report::export::{ExportDocument, ExportFormat, export_report, render_json};
use stripclean::{Engine, EngineConfig, SanitizeOptions};
use tracing::warn;

pub fn build_engine(config: Option<&Path>) -> Result<Engine> {
    let config = match config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("No se pudo cargar la configuración `{}`", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(Engine::new(config)?)
}

/// Analiza cada archivo; los fallos se informan y el resto continúa.
pub fn analyze(
    engine: &Engine,
    files: &[PathBuf],
    json: bool,
    export: Option<(ExportFormat, PathBuf)>,
) -> Result<()> {
    if !json {
        ui::render_header();
    }

    let mut failed = 0;
    for path in files {
        let target = export
            .as_ref()
            .map(|(format, output)| (*format, export_path(output, path, *format, files.len())));
        if let Err(error) = analyze_file(engine, path, json, target) {
            ui::render_error(path, &format!("{error:#}"));
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} de {} archivos no se pudieron analizar", files.len());
    }
    Ok(())
}

fn analyze_file(
    engine: &Engine,
    path: &Path,
    json: bool,
    export: Option<(ExportFormat, PathBuf)>,
) -> Result<()> {
    let data = fs::read(path)
        .with_context(|| format!("No se pudo leer `{}`", path.display()))?;
    let report = engine.analyze(&data)?;
    let basic = engine.basic_info(&data)?;

    let name = path.display().to_string();
    let document = ExportDocument {
        file: &name,
        basic_info: &basic,
        report: &report,
    };

    if json {
        println!("{}", render_json(&document)?);
    } else {
        ui::render_basic_info(path, data.len(), &basic);
        ui::render_report(&report);
    }

    if let Some((format, output)) = export {
        export_report(&document, format, &output)?;
        let message = format!("Reporte {} exportado a {}", format.label(), output.display());
        if json {
            eprintln!("{message}");
        } else {
            println!("{}\n", style(message).dim());
        }
    }
    Ok(())
}

/// Con varios archivos, `output` es un directorio y cada reporte lleva el
/// nombre de su imagen.
fn export_path(output: &Path, image: &Path, format: ExportFormat, total: usize) -> PathBuf {
    if total == 1 {
        return output.to_path_buf();
    }
    let stem = image.file_stem().unwrap_or_default().to_string_lossy();
    output.join(format!("{stem}.{}", format.extension()))
}

/// Limpia `file` y escribe el resultado en `output` o sobre el original.
///
/// La escritura pasa por un temporal en el mismo directorio que se renombra
/// al final, de modo que un fallo nunca deja el destino a medias.
pub fn clean(engine: &Engine, file: &Path, output: Option<PathBuf>, keep: Vec<String>) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("No se pudo leer `{}`", file.display()))?;

    println!("\n{}", style("│ Eliminando metadata de imagen...").dim());
    let cleaned = engine.clean(&data, &SanitizeOptions { keep })?;

    let target = output.unwrap_or_else(|| file.to_path_buf());
    let temp = temp_path(&target);
    fs::write(&temp, &cleaned.data)
        .with_context(|| format!("No se pudo escribir `{}`", temp.display()))?;
    if let Err(error) = fs::rename(&temp, &target) {
        if let Err(cleanup) = fs::remove_file(&temp) {
            warn!(%cleanup, path = %temp.display(), "no se pudo borrar el temporal");
        }
        return Err(error)
            .with_context(|| format!("No se pudo reemplazar `{}`", target.display()));
    }

    ui::render_clean_result(&target, data.len(), &cleaned);
    Ok(())
}

fn temp_path(target: &Path) -> PathBuf {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let stem = target.file_stem().unwrap_or_default().to_string_lossy();
    let extension = target.extension().unwrap_or_default().to_string_lossy();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    parent.join(format!(".{stem}_temp_{timestamp}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripclean::fixtures;
    use tempfile::tempdir;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).expect("configuración por defecto")
    }

    #[test]
    fn clean_replaces_file_in_place() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("foto.jpg");
        fs::write(&source, fixtures::jpeg_with_everything())?;

        clean(&engine(), &source, None, Vec::new())?;

        let report = engine().analyze(&fs::read(&source)?)?;
        assert!(report.is_clean());
        let leftovers = fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1, "no deben quedar temporales");
        Ok(())
    }

    #[test]
    fn clean_to_output_keeps_original() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("foto.png");
        let target = dir.path().join("limpia.png");
        let original = fixtures::png_with_everything();
        fs::write(&source, &original)?;

        clean(&engine(), &source, Some(target.clone()), vec!["Orientation".into()])?;

        assert_eq!(fs::read(&source)?, original);
        let report = engine().analyze(&fs::read(&target)?)?;
        let names: Vec<&str> = report.tags.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, vec!["Orientation"]);
        Ok(())
    }

    #[test]
    fn analyze_exports_one_report_per_image() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("a.jpg");
        let second = dir.path().join("b.webp");
        fs::write(&first, fixtures::jpeg_with_everything())?;
        fs::write(&second, fixtures::webp_with_everything())?;

        let reports = dir.path().join("reportes");
        fs::create_dir(&reports)?;
        analyze(
            &engine(),
            &[first, second],
            true,
            Some((ExportFormat::Txt, reports.clone())),
        )?;

        let text = fs::read_to_string(reports.join("a.txt"))?;
        assert!(text.contains("Críticas"));
        assert!(reports.join("b.txt").exists());
        Ok(())
    }

    #[test]
    fn unreadable_file_fails_the_run() {
        let result = analyze(&engine(), &[PathBuf::from("/no/existe.jpg")], true, None);
        assert!(result.is_err());
    }
}
