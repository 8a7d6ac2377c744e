//! Function schemas advertised to the realtime model.

use serde_json::{Value, json};

pub const SEARCH: &str = "search";
pub const REPORT_GROUNDING: &str = "report_grounding";
pub const GET_POLICIES: &str = "get_policies";
pub const GET_CLAIMS: &str = "get_claims";
pub const GET_REAL_POLICIES: &str = "get_real_policies";
pub const GET_AGENCIES: &str = "get_agencies";
pub const GET_CONTACT_INFO: &str = "get_contact_info";

const HOLDER_NAME_DESCRIPTION: &str =
    "Full name or partial name of the policyholder (e.g., 'Jean Dupont', 'Jean', 'Dupont')";

/// Wrap a property map in the function envelope
fn function(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "name": name,
        "description": description,
        "parameters": {
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }
    })
}

fn string_property(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

pub fn search() -> Value {
    function(
        SEARCH,
        "Search the knowledge base. The knowledge base is in English, translate to and from English if \
         needed. Results are formatted as a source name first in square brackets, followed by the text \
         content, and a line with '-----' at the end of each result.",
        json!({"query": string_property("Search query")}),
        &["query"],
    )
}

pub fn report_grounding() -> Value {
    function(
        REPORT_GROUNDING,
        "Report use of a source from the knowledge base as part of an answer (effectively, cite the source). \
         Sources appear in square brackets before each knowledge base passage. Always use this tool to cite \
         sources when responding with information from the knowledge base. This will display the referenced \
         FAQ entries to the user for transparency.",
        json!({
            "sources": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of source chunk IDs from the last search results that were actually used to formulate the response. Do not include sources that were not used."
            },
            "confidence_level": {
                "type": "string",
                "enum": ["high", "medium", "low"],
                "description": "Confidence level in the information provided based on source quality and relevance"
            },
            "summary": string_property(
                "Brief summary of what information was extracted from these sources (optional but recommended for UI display)"
            )
        }),
        &["sources"],
    )
}

pub fn policies() -> Value {
    function(
        GET_POLICIES,
        "Retrieve insurance policy information for Contoso demo customers. Each policy includes holder details, \
         coverage type, premiums, vehicle/property information, and status. Supports flexible name search by \
         full name, first name, or last name.",
        json!({
            "policy_number": string_property("Policy number (e.g., CONTOSO-AUTO-001, CONTOSO-HAB-002)"),
            "name": string_property(HOLDER_NAME_DESCRIPTION),
            "first_name": string_property("First name of the policyholder (e.g., 'Jean', 'Marie')"),
            "last_name": string_property("Last name of the policyholder (e.g., 'Dupont', 'Martin')"),
            "policy_type": string_property(
                "Type of policy (Auto, Habitation, Santé, Professionnelle, Vie, Moto, Jeune, Voyage)"
            )
        }),
        &[],
    )
}

pub fn claims() -> Value {
    function(
        GET_CLAIMS,
        "Retrieve insurance claim information for Contoso demo policies. Each claim includes claim number, \
         policy details, type, amounts, status, and processing information. Supports flexible name search by \
         full name, first name, or last name.",
        json!({
            "claim_number": string_property("Claim ID (e.g., CLAIM-001, CLAIM-002)"),
            "policy_number": string_property("Associated policy number (e.g., CONTOSO-AUTO-001)"),
            "holder_name": string_property(HOLDER_NAME_DESCRIPTION),
            "first_name": string_property("First name of the claim holder (e.g., 'Jean', 'Marie')"),
            "last_name": string_property("Last name of the claim holder (e.g., 'Dupont', 'Martin')"),
            "claim_type": string_property(
                "Type of claim (Auto, Collision, Dégât des eaux, Vol, Bris de glace, Tempête, etc.)"
            )
        }),
        &[],
    )
}

pub fn real_policies() -> Value {
    function(
        GET_REAL_POLICIES,
        "Retrieve comprehensive real-time policy information from the Contoso demo system database, including \
         detailed coverage limits, payment history, and current status. Supports flexible name search.",
        json!({
            "policy_type": string_property(
                "Filter by policy type (Auto, Habitation, Santé, Professionnelle, Vie, Moto, Jeune, Voyage)"
            ),
            "status": string_property("Filter by policy status (active, suspended, expired, pending_claim)"),
            "holder_name": string_property(HOLDER_NAME_DESCRIPTION),
            "first_name": string_property("First name of the policyholder (e.g., 'Jean', 'Marie')"),
            "last_name": string_property("Last name of the policyholder (e.g., 'Dupont', 'Martin')")
        }),
        &[],
    )
}

pub fn agencies() -> Value {
    function(
        GET_AGENCIES,
        "Retrieve Contoso agency information including contact details, locations, and agent information for \
         customer service.",
        json!({
            "city": string_property("City to find nearby agencies (e.g., Lyon, Paris, Bordeaux)"),
            "agent_name": string_property("Name of specific insurance agent")
        }),
        &[],
    )
}

pub fn contact_info() -> Value {
    function(
        GET_CONTACT_INFO,
        "Retrieve Contoso contact information including phone numbers for customer service, claims, \
         emergencies, and specific departments.",
        json!({
            "service_type": string_property(
                "Type of service needed (customer_service, claims, emergency, roadside_assistance)"
            ),
            "company": string_property("Insurance company (e.g., Contoso)")
        }),
        &[],
    )
}
