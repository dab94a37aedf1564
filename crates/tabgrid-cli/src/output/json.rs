use tabgrid_core::error::TabgridError;

use crate::commands::ExtractedDocument;

pub fn to_value(doc: &ExtractedDocument) -> Result<serde_json::Value, TabgridError> {
    let mut value = serde_json::to_value(&doc.result)?;
    if !doc.header.is_empty() {
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "account_information".into(),
                serde_json::to_value(&doc.header)?,
            );
        }
    }
    Ok(value)
}

pub fn print(doc: &ExtractedDocument) -> Result<(), TabgridError> {
    let json = serde_json::to_string_pretty(&to_value(doc)?)?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabgrid_core::statement::StatementHeader;
    use tabgrid_core::DocumentResult;

    #[test]
    fn test_account_information_only_when_present() {
        let mut doc = ExtractedDocument {
            result: DocumentResult::default(),
            header: StatementHeader::default(),
        };
        let plain = to_value(&doc).unwrap();
        assert!(plain.get("account_information").is_none());
        assert!(plain.get("pages").is_some());

        doc.header.account_no = Some("0123456789".into());
        let with_header = to_value(&doc).unwrap();
        assert_eq!(
            with_header["account_information"]["account_no"],
            "0123456789"
        );
    }
}
