//! Formatos de presentación compartidos por la CLI.

use comfy_table::Color;
use stripclean::RiskTier;

const TABLE_VALUE_CHARS: usize = 60;

pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["bytes", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} bytes")
    } else {
        format!("{value:.2} {} ({bytes} bytes)", UNITS[unit])
    }
}

/// Etiqueta del nivel tal como se muestra en consola.
pub fn tier_label(tier: RiskTier) -> &'static str {
    match tier {
        RiskTier::Critical => "CRÍTICO",
        RiskTier::Warning => "ADVERTENCIA",
        RiskTier::Safe => "SEGURO",
    }
}

pub fn tier_color(tier: RiskTier) -> Color {
    match tier {
        RiskTier::Critical => Color::Red,
        RiskTier::Warning => Color::Yellow,
        RiskTier::Safe => Color::Green,
    }
}

/// Recorta valores largos para que quepan en una celda.
pub fn cell_value(value: &str) -> String {
    if value.chars().count() <= TABLE_VALUE_CHARS {
        return value.to_string();
    }
    let mut short: String = value.chars().take(TABLE_VALUE_CHARS - 1).collect();
    short.push('…');
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KiB (2048 bytes)");
    }

    #[test]
    fn long_values_are_shortened() {
        let value = cell_value(&"x".repeat(100));
        assert_eq!(value.chars().count(), TABLE_VALUE_CHARS);
        assert!(value.ends_with('…'));
    }
}
