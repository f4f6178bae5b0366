use rand::Rng;

/// Display colors assigned to collaborator cursors. Mirrors the palette the
/// web clients render with; the draw happens once per session and the color
/// sticks for the session's lifetime.
pub const PALETTE: [&str; 12] = [
    "#e94560", "#0f3460", "#16c79a", "#f0a500", "#7952b3", "#fb5607",
    "#3a86ff", "#ff006e", "#8338ec", "#06d6a0", "#ef476f", "#118ab2",
];

pub fn pick_color() -> String {
    let index = rand::rng().random_range(0..PALETTE.len());
    PALETTE[index].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picked_color_comes_from_palette() {
        for _ in 0..32 {
            let color = pick_color();
            assert!(PALETTE.contains(&color.as_str()));
        }
    }
}
