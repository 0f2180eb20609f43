//! Presentación en consola: cabecera, tablas de metadata y avisos.

use crate::formatting::{cell_value, format_size, tier_color, tier_label};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Row, Table};
use console::style;
use std::path::Path;
use stripclean::{AnalysisReport, BasicInfo, CleanOutput};

const HEADER_WIDTH: usize = 74;

pub fn render_header() {
    let border = "─".repeat(HEADER_WIDTH - 2);
    println!("\n{}", style(format!("┌{border}┐")).cyan());
    println!(
        "{}",
        style(format!(
            "│ {:^inner_width$} │",
            "▸ StripClean · Metadata de Imágenes ◂",
            inner_width = HEADER_WIDTH - 4
        ))
        .cyan()
        .bold()
    );
    println!("{}\n", style(format!("└{border}┘")).cyan());
}

pub fn render_basic_info(path: &Path, file_size: usize, basic: &BasicInfo) {
    println!("{}", style(format!("┌─ {}", path.display())).cyan().bold());

    let mut table = base_table(["Propiedad", "Valor"]);
    table.add_row(property_row("Formato", &basic.format));
    table.add_row(property_row("Resolución", &basic.size));
    table.add_row(property_row("Modo de color", &basic.mode));
    table.add_row(property_row("MIME", &basic.mime));
    table.add_row(property_row("Tamaño", &format_size(file_size)));
    println!("{table}");
}

/// Tabla de etiquetas ordenada de mayor a menor riesgo, más el resumen.
pub fn render_report(report: &AnalysisReport) {
    if report.is_clean() {
        println!(
            "\n{}",
            style("│ La imagen no contiene metadata detectable.").green()
        );
    } else {
        let mut table = base_table(["Nivel", "Origen", "Etiqueta", "Valor"]);
        for tag in report.sorted_by_risk() {
            let color = tier_color(tag.tier);
            table.add_row(Row::from(vec![
                Cell::new(tier_label(tag.tier))
                    .fg(color)
                    .add_attribute(Attribute::Bold),
                Cell::new(tag.namespace.to_string()).fg(Color::DarkGrey),
                Cell::new(&tag.name).fg(label_color()),
                Cell::new(cell_value(&tag.value)).fg(color),
            ]));
        }
        println!("\n{table}");
    }

    let summary = report.summary;
    println!(
        "\n{} {}  {} {}  {} {}",
        style("Críticas:").red().bold(),
        summary.critical,
        style("Advertencias:").yellow().bold(),
        summary.warning,
        style("Seguras:").green().bold(),
        summary.safe,
    );

    if let Some(position) = report.gps_position() {
        println!("\n{}", style("┌─ Aviso de privacidad ─").red());
        println!(
            "{}",
            style(format!("│ La imagen revela dónde se tomó: {}", position.value))
                .red()
                .bold()
        );
        println!("{}", style("│ Límpiala antes de compartirla.").red());
        println!("{}", style("└─").red());
    }

    if report.partial || !report.notes.is_empty() {
        println!("\n{}", style("┌─ Avisos del análisis ─").yellow());
        for note in &report.notes {
            println!("{}", style(format!("│ {note}")).yellow());
        }
        if report.partial {
            println!("{}", style("│ El reporte puede estar incompleto.").yellow());
        }
        println!("{}", style("└─").yellow());
    }
    println!();
}

pub fn render_clean_result(target: &Path, before: usize, output: &CleanOutput) {
    println!("\n{}", style("┌─ Metadata Eliminada Exitosamente ─").green());
    println!(
        "{}",
        style(format!("│ Archivo: {}", target.display())).green().bold()
    );
    println!(
        "{}",
        style(format!(
            "│ Segmentos eliminados: {} ({} → {})",
            output.removed,
            format_size(before),
            format_size(output.data.len())
        ))
        .green()
    );
    println!("{}", style("│ Los píxeles se copiaron sin recodificar.").green());
    println!("{}\n", style("└─").green());
}

pub fn render_error(path: &Path, message: &str) {
    eprintln!(
        "{} {}",
        style(format!("✗ {}:", path.display())).red().bold(),
        style(message).red()
    );
}

fn base_table<const N: usize>(headers: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.into_iter().map(header_cell).collect::<Vec<_>>());
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
        .add_attribute(Attribute::Underlined)
}

fn label_color() -> Color {
    Color::Rgb {
        r: 160,
        g: 196,
        b: 255,
    }
}

fn property_row(label: &str, value: &str) -> Row {
    Row::from(vec![
        Cell::new(label).fg(label_color()),
        Cell::new(value).fg(Color::White),
    ])
}
