//! Prompt templates for support answers

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Assistant persona and grounding rules prepended to every prompt
pub const SYSTEM_PROMPT: &str = "You are an intelligent customer service assistant for Home Essentials, a smart home and electronics retailer.

Your responsibilities:
- Answer customer questions about products, policies, orders, and technical issues
- Provide accurate information based on the knowledge base
- Be helpful, professional, and concise
- If information is not in the provided context, politely say you don't have that information
- Always cite specific policy numbers (e.g., AP-001) or product SKUs when relevant

Guidelines:
- Use the provided context to answer questions accurately
- Don't make up information not in the context
- For technical issues, provide step-by-step troubleshooting
- For policy questions, reference the specific policy section
- Be empathetic and customer-focused
";

const TROUBLESHOOTING_TEMPLATE: &str = "Based on the provided technical information, help the customer troubleshoot their issue.

Provide:
1. Quick diagnosis of the likely problem
2. Step-by-step solution
3. Alternative solutions if the first doesn't work
4. When to contact support (if needed)

Context: {context}
Issue: {query}
";

const PRODUCT_TEMPLATE: &str = "Provide detailed product information to help the customer make an informed decision.

Include:
- Key specifications
- Features and benefits
- Pricing and warranty information
- Compatibility considerations (if applicable)

Context: {context}
Question: {query}
";

const POLICY_TEMPLATE: &str = "Explain the relevant company policy clearly and accurately.

Include:
- Policy number and name
- Key terms and conditions
- Important deadlines or requirements
- Next steps for the customer

Context: {context}
Question: {query}
";

/// Question category selecting a specialised template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryKind {
    Troubleshooting,
    Product,
    Policy,
    #[default]
    General,
}

impl QueryKind {
    fn template(self) -> Option<&'static str> {
        match self {
            QueryKind::Troubleshooting => Some(TROUBLESHOOTING_TEMPLATE),
            QueryKind::Product => Some(PRODUCT_TEMPLATE),
            QueryKind::Policy => Some(POLICY_TEMPLATE),
            QueryKind::General => None,
        }
    }
}

impl FromStr for QueryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "troubleshooting" => Ok(QueryKind::Troubleshooting),
            "product" => Ok(QueryKind::Product),
            "policy" => Ok(QueryKind::Policy),
            "general" | "" => Ok(QueryKind::General),
            other => Err(Error::config(format!("unknown query kind: {}", other))),
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::Troubleshooting => "troubleshooting",
            QueryKind::Product => "product",
            QueryKind::Policy => "policy",
            QueryKind::General => "general",
        };
        f.write_str(name)
    }
}

/// Prompt builder for support queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Single-turn prompt: system rules, retrieved context, the question
    pub fn rag_prompt(query: &str, context: &str) -> String {
        format!(
            "{SYSTEM_PROMPT}\n\nKNOWLEDGE BASE CONTEXT:\n{context}\n\nCUSTOMER QUESTION:\n{query}\n\nASSISTANT RESPONSE:\n"
        )
    }

    /// Prompt that also carries the rendered conversation so far
    pub fn followup_prompt(query: &str, context: &str, history: &str) -> String {
        format!(
            "{SYSTEM_PROMPT}\n\nCONVERSATION HISTORY:\n{history}\n\nKNOWLEDGE BASE CONTEXT:\n{context}\n\nCUSTOMER QUESTION:\n{query}\n\nASSISTANT RESPONSE:\n"
        )
    }

    /// Category-specific prompt; `General` is the plain RAG prompt
    pub fn specialized_prompt(kind: QueryKind, query: &str, context: &str) -> String {
        match kind.template() {
            Some(template) => format!(
                "{}\n\n{}",
                SYSTEM_PROMPT,
                template.replace("{context}", context).replace("{query}", query)
            ),
            None => Self::rag_prompt(query, context),
        }
    }
}
