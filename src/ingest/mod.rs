//! Ticket CSV ingestion.
//!
//! Header-mapped and forgiving: column order is free, a couple of
//! legacy header spellings are accepted, unknown segments fold to
//! Mass, and a missing customer_guid is synthesised. Only a missing
//! description column (or an upload with no usable rows) is a
//! batch-level error.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::{Segment, TicketRecord};
use crate::error::{Error, Result};

/// Parse an uploaded ticket CSV into records, skipping rows without a
/// description.
pub fn parse_tickets(data: &[u8]) -> Result<Vec<TicketRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|err| Error::InputInvalid(format!("unreadable CSV header: {err}")))?
        .clone();

    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect();

    let column = |names: &[&str]| names.iter().find_map(|n| index.get(*n).copied());

    let Some(description_col) = column(&["description"]) else {
        return Err(Error::InputInvalid("missing description column".to_string()));
    };
    let guid_col = column(&["customer_guid", "guid"]);
    let gender_col = column(&["gender"]);
    let birth_col = column(&["date_of_birth", "birth_date"]);
    let attachments_col = column(&["attachments"]);
    let segment_col = column(&["segment", "client_segment"]);
    let country_col = column(&["country"]);
    let region_col = column(&["region"]);
    let city_col = column(&["city"]);
    let street_col = column(&["street"]);
    let building_col = column(&["building_number", "building"]);

    let mut tickets = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| Error::InputInvalid(format!("bad CSV row: {err}")))?;
        let field = |col: Option<usize>| -> Option<String> {
            col.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let Some(description) = field(Some(description_col)) else {
            continue;
        };

        tickets.push(TicketRecord {
            customer_guid: field(guid_col).unwrap_or_else(|| Uuid::new_v4().to_string()),
            gender: field(gender_col),
            date_of_birth: field(birth_col),
            description,
            attachments: field(attachments_col),
            segment: field(segment_col)
                .map(|s| Segment::from_label(&s))
                .unwrap_or_default(),
            country: field(country_col),
            region: field(region_col),
            city: field(city_col),
            street: field(street_col),
            building_number: field(building_col),
            latitude: None,
            longitude: None,
        });
    }

    Ok(tickets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_csv() {
        let data = "customer_guid,description,segment,city\n\
                    c-1,Не работает приложение,VIP,Астана\n\
                    c-2,Вопрос по тарифам,Unknown,Алматы\n";
        let tickets = parse_tickets(data.as_bytes()).unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].customer_guid, "c-1");
        assert_eq!(tickets[0].segment, Segment::Vip);
        assert_eq!(tickets[1].segment, Segment::Mass);
        assert_eq!(tickets[1].city.as_deref(), Some("Алматы"));
        assert!(tickets[0].latitude.is_none());
    }

    #[test]
    fn test_missing_description_column_is_an_error() {
        let data = "customer_guid,city\nc-1,Астана\n";
        let err = parse_tickets(data.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InputInvalid(_)));
    }

    #[test]
    fn test_guid_is_synthesised_when_absent() {
        let data = "description\nПомогите со входом\n";
        let tickets = parse_tickets(data.as_bytes()).unwrap();
        assert_eq!(tickets.len(), 1);
        assert!(!tickets[0].customer_guid.is_empty());
    }

    #[test]
    fn test_rows_without_description_are_skipped() {
        let data = "customer_guid,description\nc-1,\nc-2,Жалоба на комиссию\n";
        let tickets = parse_tickets(data.as_bytes()).unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].customer_guid, "c-2");
    }

    #[test]
    fn test_legacy_header_spellings() {
        let data = "guid,description,client_segment,building\nc-9,Текст,Priority,12\n";
        let tickets = parse_tickets(data.as_bytes()).unwrap();
        assert_eq!(tickets[0].customer_guid, "c-9");
        assert_eq!(tickets[0].segment, Segment::Priority);
        assert_eq!(tickets[0].building_number.as_deref(), Some("12"));
    }
}
