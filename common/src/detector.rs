// Ticket availability detection
//
// Rules run in order against the page HTML, ignoring <script>, <style> and
// comments:
//   1. any text node containing a buy phrase
//   2. fewer "coming soon" text nodes than expected (only when configured)
//   3. one of the first N buttons reads like BUY/GET ... TICKET
// The first rule that fires decides the status.

use crate::config::DetectionConfig;
use crate::errors::DetectionError;
use crate::models::{AvailabilityReason, DetectionReport, TicketStatus};
use regex::Regex;
use tracing::{info, instrument};

/// Evaluates ticket page HTML against the alerting rules
pub struct AvailabilityDetector {
    config: DetectionConfig,
    hidden_content: Regex,
    tag: Regex,
    button: Regex,
    whitespace: Regex,
}

impl AvailabilityDetector {
    pub fn new(config: DetectionConfig) -> Result<Self, DetectionError> {
        Ok(Self {
            config,
            hidden_content: compile(
                r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->",
            )?,
            tag: compile(r"(?s)<[^>]*>")?,
            button: compile(r"(?is)<button\b[^>]*>(.*?)</button\s*>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Evaluate a page and decide whether tickets are on sale
    #[instrument(skip(self, html), fields(html_len = html.len()))]
    pub fn evaluate(&self, html: &str) -> DetectionReport {
        let visible = self.hidden_content.replace_all(html, " ");
        let text_nodes = self.text_nodes(&visible);

        let buy_ticket_matches = count_containing(&text_nodes, &self.config.buy_phrases);
        let coming_soon_matches = count_containing(&text_nodes, &self.config.coming_soon_phrases);

        info!(count = buy_ticket_matches, "Found 'BUY TICKETS' elements on the page");
        info!(count = coming_soon_matches, "Found 'COMING SOON' elements on the page");

        let buttons = self.button_texts(&visible);
        info!(count = buttons.len(), "Found button elements");

        let inspected_buttons: Vec<String> = buttons
            .into_iter()
            .take(self.config.max_buttons_inspected)
            .collect();

        let status = self.decide(buy_ticket_matches, coming_soon_matches, &inspected_buttons);

        DetectionReport {
            buy_ticket_matches,
            coming_soon_matches,
            buttons_found: self.button.find_iter(&visible).count(),
            inspected_buttons,
            status,
        }
    }

    fn decide(
        &self,
        buy_ticket_matches: usize,
        coming_soon_matches: usize,
        inspected_buttons: &[String],
    ) -> TicketStatus {
        if buy_ticket_matches > 0 {
            info!("Tickets are available: found 'BUY TICKETS' elements");
            return TicketStatus::Available {
                reason: AvailabilityReason::BuyTicketText {
                    count: buy_ticket_matches,
                },
            };
        }

        if let Some(expected) = self.config.expected_coming_soon_count {
            if coming_soon_matches < expected {
                info!(
                    found = coming_soon_matches,
                    expected, "Possible ticket availability: fewer 'COMING SOON' elements than expected"
                );
                return TicketStatus::Available {
                    reason: AvailabilityReason::ComingSoonBelowThreshold {
                        found: coming_soon_matches,
                        expected,
                    },
                };
            }
        }

        for (i, text) in inspected_buttons.iter().enumerate() {
            info!(index = i + 1, text = %text, "Inspected button");
            if is_purchase_button(text) {
                info!("Tickets are available: found button with ticket purchase text");
                return TicketStatus::Available {
                    reason: AvailabilityReason::PurchaseButton { text: text.clone() },
                };
            }
        }

        info!("Tickets not available yet - all checks indicate tickets are not on sale");
        TicketStatus::NotAvailable
    }

    fn text_nodes(&self, html: &str) -> Vec<String> {
        self.tag
            .split(html)
            .map(decode_entities)
            .filter(|t| !t.trim().is_empty())
            .collect()
    }

    /// Visible button labels, upper-cased with whitespace collapsed
    fn button_texts(&self, html: &str) -> Vec<String> {
        self.button
            .captures_iter(html)
            .map(|cap| {
                let inner = cap.get(1).map_or("", |m| m.as_str());
                let text = decode_entities(&self.tag.replace_all(inner, " "));
                self.whitespace
                    .replace_all(text.trim(), " ")
                    .to_uppercase()
            })
            .collect()
    }
}

/// BUY or GET together with TICKET, on an upper-cased label
pub fn is_purchase_button(text: &str) -> bool {
    (text.contains("BUY") || text.contains("GET")) && text.contains("TICKET")
}

fn compile(pattern: &str) -> Result<Regex, DetectionError> {
    Regex::new(pattern).map_err(|e| DetectionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn count_containing(nodes: &[String], phrases: &[String]) -> usize {
    nodes
        .iter()
        .filter(|node| {
            phrases
                .iter()
                .any(|p| !p.is_empty() && node.contains(p.as_str()))
        })
        .count()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
