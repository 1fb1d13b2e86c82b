//! Partner-list parsing
//!
//! Visit records carry the other players on a booking as free text. The
//! accepted grammar is a comma-separated list of entries:
//!
//! ```text
//! list  := entry ("," entry)*
//! entry := [name] ["("] "#" digits [")"]
//! ```
//!
//! Only the `#digits` identifier is significant; the display name is kept
//! when present. Text that contains no `#digits` token yields no partners.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// One player referenced in a partner list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerRef {
    pub id: String,
    pub name: Option<String>,
}

impl fmt::Display for PartnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} (#{})", name, self.id),
            None => write!(f, "#{}", self.id),
        }
    }
}

fn partner_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?P<name>[^,#()]*?)\s*\(?#(?P<id>\d+)\)?")
            .unwrap_or_else(|e| panic!("partner pattern must compile: {e}"))
    })
}

/// Parse every partner reference out of a free-text list, in order of appearance
pub fn parse_partner_list(text: &str) -> Vec<PartnerRef> {
    partner_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let id = caps.name("id")?.as_str().to_string();
            let name = caps
                .name("name")
                .map(|m| m.as_str().trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            Some(PartnerRef { id, name })
        })
        .collect()
}

/// Render partner references back into the canonical list form
pub fn format_partner_list(partners: &[PartnerRef]) -> String {
    partners
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Distinct partner ids across several lists, excluding the customer's own id
pub fn unique_partner_ids<'a, I>(lists: I, own_id: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lists
        .into_iter()
        .flat_map(parse_partner_list)
        .map(|p| p.id)
        .filter(|id| id != own_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(id: &str, name: Option<&str>) -> PartnerRef {
        PartnerRef {
            id: id.to_string(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_named_entries() {
        let parsed = parse_partner_list("Jane Doe (#12), Bob Smith (#345)");
        assert_eq!(
            parsed,
            vec![partner("12", Some("Jane Doe")), partner("345", Some("Bob Smith"))]
        );
    }

    #[test]
    fn test_parse_bare_ids_and_noise() {
        assert_eq!(parse_partner_list("#7"), vec![partner("7", None)]);
        assert_eq!(
            parse_partner_list("#7, Ann(#8)"),
            vec![partner("7", None), partner("8", Some("Ann"))]
        );
        assert!(parse_partner_list("").is_empty());
        assert!(parse_partner_list("Guest, no id here").is_empty());
        assert!(parse_partner_list("# 12").is_empty());
    }

    #[test]
    fn test_round_trip_vectors() {
        let vectors = [
            vec![partner("1", Some("A B"))],
            vec![partner("10", Some("Jane")), partner("20", None)],
            vec![partner("99", None), partner("100", None), partner("101", Some("Zed"))],
        ];
        for refs in vectors {
            let text = format_partner_list(&refs);
            assert_eq!(parse_partner_list(&text), refs, "round trip of {text:?}");
        }
    }

    #[test]
    fn test_unique_ids_exclude_self_and_duplicates() {
        let lists = ["Me (#1), Jane (#2)", "Jane (#2), Bob (#3)", "Me (#1)"];
        let ids = unique_partner_ids(lists, "1");
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["2", "3"]);
    }
}
