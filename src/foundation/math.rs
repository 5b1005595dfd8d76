/// Multiply two `0..=255` channel values and divide by 255 with rounding.
pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    let v = x * y + 128;
    (v + (v >> 8)) >> 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_division_at_extremes() {
        assert_eq!(mul_div255_u16(0, 255), 0);
        assert_eq!(mul_div255_u16(255, 255), 255);
        assert_eq!(mul_div255_u16(255, 0), 0);
        assert_eq!(mul_div255_u16(128, 255), 128);
    }

    #[test]
    fn stays_within_channel_range() {
        for x in 0..=255u16 {
            for y in 0..=255u16 {
                let v = mul_div255_u16(x, y);
                assert!(v <= 255);
                let exact = ((x as u32 * y as u32) as f64 / 255.0).round() as u16;
                assert!(v.abs_diff(exact) <= 1, "x={x} y={y} v={v} exact={exact}");
            }
        }
    }
}
