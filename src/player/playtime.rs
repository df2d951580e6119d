/// Formats playtime seconds as `"4d 5h 30m"`, `"5h 30m"` or `"30m"`.
pub fn format_playtime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0m")]
    #[case(59, "0m")]
    #[case(1_800, "30m")]
    #[case(19_800, "5h 30m")]
    #[case(365_400, "4d 5h 30m")]
    #[case(-10, "0m")]
    fn formats_playtime(#[case] seconds: i64, #[case] expected: &str) {
        assert_eq!(format_playtime(seconds), expected);
    }
}
