//! Prompt construction for transaction classification

use crate::models::{BatchItem, CategoryRef, Flow};

/// System prompt for the classification model
pub const SYSTEM_PROMPT: &str = "\
You are a financial assistant that classifies bank transactions from Brazil.

Analyze the transaction description and pick the most appropriate category \
from the list the user provides.

Guidelines:
- Recognize Brazilian merchants and payment rails (Nubank, iFood, PIX, TED, boleto)
- Use the amount only as a secondary hint
- Be conservative with confidence when the description is generic \
(\"Transferência\", \"Pagamento\", \"PIX recebido\")
- Always answer with a single JSON object and nothing else";

/// Build the user prompt for one transaction.
///
/// Lists every candidate category with its id so the model can answer with
/// an exact id, and pins the strict JSON response contract.
pub fn classification_prompt(item: &BatchItem, categories: &[CategoryRef]) -> String {
    let catalog = categories
        .iter()
        .map(|c| format!("- ID: {} | {}", c.id, c.name))
        .collect::<Vec<_>>()
        .join("\n");

    let flow_label = match item.flow {
        Flow::Credit => "income",
        Flow::Debit => "expense",
    };

    format!(
        "Classify this bank transaction.\n\n\
         Description: \"{}\"\n\
         Amount: {:.2}\n\
         Direction: {}\n\n\
         Available categories:\n{}\n\n\
         Answer with ONLY a JSON object, no markdown, no extra text:\n\
         {{\"category_id\": \"<exact id from the list, or null>\", \
         \"confidence\": <0.0 to 1.0>, \
         \"reasoning\": \"<short explanation, max 60 chars>\"}}",
        item.description, item.amount, flow_label, catalog
    )
}
