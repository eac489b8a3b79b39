/// Splits reference-URL text on newlines and commas, keeping at most `max_count`
/// non-empty entries in input order. Malformed or blank text yields an empty list.
pub fn parse_reference_urls(text: Option<&str>, max_count: usize) -> Vec<String> {
    let Some(raw) = text else {
        return Vec::new();
    };
    raw.split(['\n', '\r', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .take(max_count)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_reference_urls;

    #[test]
    fn splits_on_newlines_and_commas_in_order() {
        let urls = parse_reference_urls(
            Some("https://a.example/1.png\n https://b.example/2.png ,https://c.example/3.png"),
            8,
        );
        assert_eq!(
            urls,
            vec![
                "https://a.example/1.png",
                "https://b.example/2.png",
                "https://c.example/3.png"
            ]
        );
    }

    #[test]
    fn truncates_to_max_count() {
        let text = (0..20)
            .map(|idx| format!("https://x.example/{idx}"))
            .collect::<Vec<String>>()
            .join("\n");
        let urls = parse_reference_urls(Some(&text), 4);
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[0], "https://x.example/0");
        assert_eq!(urls[3], "https://x.example/3");
    }

    #[test]
    fn blank_or_missing_text_is_empty() {
        assert!(parse_reference_urls(None, 8).is_empty());
        assert!(parse_reference_urls(Some("  \n , \r\n"), 8).is_empty());
        assert!(parse_reference_urls(Some("https://a.example"), 0).is_empty());
    }
}
