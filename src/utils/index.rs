const UNITS: [&str; 6] = ["i", "Ki", "Mi", "Gi", "Ti", "Pi"];

/// Formats an amount of atomic units with the largest unit that keeps the value at or above 1.
pub fn format_iota_amount(amount: u64) -> String {
    let mut unit = 0;
    let mut scale = 1u64;
    while unit + 1 < UNITS.len() && amount >= scale * 1000 {
        scale *= 1000;
        unit += 1;
    }

    if unit == 0 {
        return format!("{} {}", amount, UNITS[0]);
    }
    format!("{:.3} {}", amount as f64 / scale as f64, UNITS[unit])
}
