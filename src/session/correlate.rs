use crate::remote::Inference;

/// Correlation key of an image: its file name up to the first `.`.
pub fn image_timestamp(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// First inference whose `T` equals `timestamp`, scanning in received order.
///
/// Duplicate timestamps resolve to the earliest entry; no other ordering is applied.
pub fn find_matching<'a>(inferences: &'a [Inference], timestamp: &str) -> Option<&'a Inference> {
    inferences
        .iter()
        .find(|inference| inference.timestamp.as_deref() == Some(timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inference(t: &str, o: &str) -> Inference {
        Inference {
            timestamp: Some(t.into()),
            payload: Some(o.into()),
        }
    }

    #[test]
    fn timestamp_strips_everything_after_first_dot() {
        assert_eq!(image_timestamp("20240101T000000.jpg"), "20240101T000000");
        assert_eq!(image_timestamp("20240101T000000.000.jpg"), "20240101T000000");
        assert_eq!(image_timestamp("noext"), "noext");
        assert_eq!(image_timestamp(""), "");
    }

    #[test]
    fn selects_record_with_equal_timestamp() {
        let records = vec![
            inference("20231231T235959", "a"),
            inference("20240101T000000", "b"),
        ];
        let found = find_matching(&records, image_timestamp("20240101T000000.jpg")).unwrap();
        assert_eq!(found.payload.as_deref(), Some("b"));
    }

    #[test]
    fn first_duplicate_wins() {
        let records = vec![
            inference("20240101T000000", "first"),
            inference("20240101T000000", "second"),
        ];
        let found = find_matching(&records, "20240101T000000").unwrap();
        assert_eq!(found.payload.as_deref(), Some("first"));
    }

    #[test]
    fn missing_timestamp_never_matches() {
        let records = vec![Inference {
            timestamp: None,
            payload: Some("x".into()),
        }];
        assert!(find_matching(&records, "").is_none());
        assert!(find_matching(&records, "20240101T000000").is_none());
    }
}
