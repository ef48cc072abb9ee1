//! Device telemetry text fixtures

/// Column header the device sends before each batch
pub const HEADER_LINE: &str = "flex1,flex2,flex3,flex4,flex5,roll_deg,pitch_deg,ax_g,ay_g,az_g";

/// One 10-field data line, values derived from `seed`
pub fn data_line(seed: usize) -> String {
    let s = seed as f32;
    let flex: Vec<String> = (0..5)
        .map(|i| format!("{:.3}", ((s + i as f32) * 0.07) % 1.0))
        .collect();
    format!(
        "{},{:.2},{:.2},{:.3},{:.3},{:.3}",
        flex.join(","),
        (s * 3.5) % 180.0 - 90.0,
        (s * 1.5) % 90.0 - 45.0,
        0.01 * (seed % 7) as f32,
        -0.02 * (seed % 5) as f32,
        0.98
    )
}

/// One device batch: header, control line, `count` data lines
pub fn telemetry_batch(start: usize, count: usize) -> String {
    let mut text = String::new();
    text.push_str(HEADER_LINE);
    text.push_str("\r\n");
    text.push_str("# batch start\r\n");
    for i in start..start + count {
        text.push_str(&data_line(i));
        text.push_str("\r\n");
    }
    text
}
