/// Renders gateway form fields for logging with sensitive values masked.
pub fn mask_fields<K: AsRef<str>>(fields: &[(K, String)]) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            let key = key.as_ref();
            if is_sensitive_field(key) {
                format!("{}={}", key, mask_value(value))
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_uppercase().as_str(),
        "ACCOUNT_NBR" | "CVV2" | "MAC" | "BRIC" | "ORIG_AUTH_GUID" | "AUTH_GUID" | "ROUTING_NBR"
    )
}

fn mask_value(value: &str) -> String {
    if value.len() > 8 && value.is_ascii() {
        format!("{}****{}", &value[..2], &value[value.len() - 4..])
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_account_number() {
        let fields = vec![
            ("ACCOUNT_NBR", "4111111111111111".to_string()),
            ("AMOUNT", "10.00".to_string()),
        ];

        let rendered = mask_fields(&fields);
        assert_eq!(rendered, "ACCOUNT_NBR=41****1111&AMOUNT=10.00");
    }

    #[test]
    fn test_short_secrets_fully_masked() {
        let fields = vec![("CVV2", "123".to_string())];
        assert_eq!(mask_fields(&fields), "CVV2=****");
    }

    #[test]
    fn test_response_fields_are_masked_case_insensitively() {
        let fields = vec![("auth_guid".to_string(), "0A1B2C3D4E5F6G7H".to_string())];
        assert!(!mask_fields(&fields).contains("0A1B2C3D4E5F6G7H"));
    }
}
