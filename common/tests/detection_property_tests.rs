// Property-based tests for ticket availability detection

use common::config::DetectionConfig;
use common::detector::{is_purchase_button, AvailabilityDetector};
use common::models::{AvailabilityReason, TicketStatus};
use proptest::prelude::*;

fn detector() -> AvailabilityDetector {
    AvailabilityDetector::new(DetectionConfig::default()).unwrap()
}

// ============================================================================
// Pages without ticket wording are never reported as available
// ============================================================================

#[test]
fn property_pages_without_ticket_words_are_not_available() {
    proptest!(|(
        texts in prop::collection::vec("[a-z ]{0,30}", 0..20),
        buttons in prop::collection::vec("[a-z]{1,12}", 0..10),
    )| {
        // Lower-case filler can never contain an upper-case phrase or TICKET
        let mut html = String::from("<html><body>");
        for text in &texts {
            html.push_str(&format!("<p>{}</p>", text));
        }
        for label in &buttons {
            html.push_str(&format!("<button>{}</button>", label.replace("ticket", "tkt")));
        }
        html.push_str("</body></html>");

        let report = detector().evaluate(&html);

        prop_assert_eq!(report.status, TicketStatus::NotAvailable);
        prop_assert_eq!(report.buy_ticket_matches, 0);
        prop_assert_eq!(report.buttons_found, buttons.len());
        prop_assert!(report.inspected_buttons.len() <= 5);
    });
}

// ============================================================================
// A buy phrase anywhere in visible text makes tickets available
// ============================================================================

#[test]
fn property_buy_phrase_is_always_detected() {
    proptest!(|(
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
        phrase in prop::sample::select(vec!["BUY TICKETS", "Buy Tickets", "Get Tickets"]),
        position in 0usize..5,
    )| {
        let mut nodes: Vec<String> = (0..5).map(|i| format!("<div>filler {}</div>", i)).collect();
        nodes.insert(position, format!("<span>{}{}{}</span>", prefix, phrase, suffix));
        let html = nodes.concat();

        let report = detector().evaluate(&html);

        prop_assert_eq!(report.buy_ticket_matches, 1);
        prop_assert_eq!(
            report.status,
            TicketStatus::Available { reason: AvailabilityReason::BuyTicketText { count: 1 } }
        );
    });
}

// ============================================================================
// Text inside scripts never counts
// ============================================================================

#[test]
fn property_script_text_is_ignored() {
    proptest!(|(
        phrase in prop::sample::select(vec!["BUY TICKETS", "Buy Tickets", "Get Tickets"]),
        var in "[a-z]{1,10}",
    )| {
        let html = format!(
            "<script>var {} = \"{}\";</script><p>COMING SOON</p>",
            var, phrase
        );
        let report = detector().evaluate(&html);
        prop_assert_eq!(report.status, TicketStatus::NotAvailable);
    });
}

// ============================================================================
// Coming-soon threshold
// ============================================================================

#[test]
fn property_coming_soon_threshold() {
    proptest!(|(
        found in 0usize..12,
        expected in 1usize..12,
    )| {
        let config = DetectionConfig {
            expected_coming_soon_count: Some(expected),
            ..DetectionConfig::default()
        };
        let html: String = (0..found).map(|_| "<span>COMING SOON</span>").collect();

        let report = AvailabilityDetector::new(config).unwrap().evaluate(&html);

        prop_assert_eq!(report.coming_soon_matches, found);
        prop_assert_eq!(report.status.is_available(), found < expected);
    });
}

// ============================================================================
// Purchase button classification
// ============================================================================

#[test]
fn property_purchase_button_requires_verb_and_ticket() {
    proptest!(|(label in "[A-Z ]{0,30}")| {
        let expected = (label.contains("BUY") || label.contains("GET")) && label.contains("TICKET");
        prop_assert_eq!(is_purchase_button(&label), expected);
    });
}

#[test]
fn property_only_leading_buttons_are_inspected() {
    proptest!(|(
        filler in 0usize..10,
        label in prop::sample::select(vec!["Buy Tickets", "get ticket", "BUY TICKET NOW"]),
    )| {
        let mut html: String = (0..filler).map(|i| format!("<button>Filter {}</button>", i)).collect();
        html.push_str(&format!("<button>{}</button>", label));

        let report = detector().evaluate(&html);

        // "Buy Tickets" is also a buy phrase and wins regardless of position
        if label == "Buy Tickets" {
            prop_assert!(report.status.is_available());
        } else {
            prop_assert_eq!(report.status.is_available(), filler < 5);
        }
    });
}
