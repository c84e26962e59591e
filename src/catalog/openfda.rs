//! OpenFDA tool catalog (REST backend).
//!
//! Each tool maps its arguments one-to-one onto query-string pairs of a
//! fixed openFDA endpoint.

use crate::backend::rest::RestEndpoint;
use crate::schema::{ParamSpec, ToolSpec};

pub const INSTRUCTIONS: &str = "OpenFDA gateway. Search FDA enforcement reports (drug, device and \
food recalls), adverse event reports, drug labels and Drugs@FDA approvals. Every search tool \
accepts `limit` (1-100, default 10) and `skip` for paging. A search that matches nothing returns \
an empty result, not an error.";

const CLASSIFICATIONS: &[&str] = &["Class I", "Class II", "Class III"];
const RECALL_STATUSES: &[&str] = &["Ongoing", "Completed", "Terminated", "Pending"];

fn limit() -> ParamSpec {
    ParamSpec::integer("limit")
        .range(1.0, 100.0)
        .default_value(10)
        .describe("Maximum number of records to return (1-100)")
}

fn skip() -> ParamSpec {
    ParamSpec::integer("skip")
        .range(0.0, 25_000.0)
        .describe("Number of records to skip, for paging")
}

fn classification() -> ParamSpec {
    ParamSpec::one_of("classification", CLASSIFICATIONS)
        .describe("Recall severity; Class I is the most serious")
}

fn status() -> ParamSpec {
    ParamSpec::one_of("status", RECALL_STATUSES).describe("Recall status")
}

fn recalling_firm() -> ParamSpec {
    ParamSpec::string("recalling_firm").describe("Firm that initiated the recall")
}

pub fn endpoints() -> Vec<RestEndpoint> {
    vec![
        RestEndpoint::new(
            "/drug/enforcement.json",
            ToolSpec::new(
                "search_drug_recalls",
                "Search FDA drug recall enforcement reports by classification, firm, product or reason.",
            )
            .param(classification())
            .param(status())
            .param(recalling_firm())
            .param(ParamSpec::string("product_description").describe("Words from the product description"))
            .param(ParamSpec::string("reason_for_recall").describe("Words from the recall reason"))
            .param(ParamSpec::string("state").describe("Two-letter US state of the recalling firm"))
            .param(limit())
            .param(skip()),
        ),
        RestEndpoint::new(
            "/drug/event.json",
            ToolSpec::new(
                "search_adverse_events",
                "Search FAERS adverse event reports for a drug, a reaction, or both.",
            )
            .param(ParamSpec::string("medicinal_product").describe("Drug name as reported"))
            .param(ParamSpec::string("reaction").describe("MedDRA reaction term, e.g. 'nausea'"))
            .param(ParamSpec::boolean("serious").describe("Only serious (true) or non-serious (false) reports"))
            .param(ParamSpec::one_of("patient_sex", &["unknown", "male", "female"]))
            .param(ParamSpec::string("occur_country").describe("Country where the event occurred (ISO code)"))
            .param(limit())
            .param(skip()),
        ),
        RestEndpoint::new(
            "/drug/label.json",
            ToolSpec::new(
                "search_drug_labels",
                "Search structured product labels (indications, warnings, dosage) by brand or generic name.",
            )
            .param(ParamSpec::string("brand_name"))
            .param(ParamSpec::string("generic_name"))
            .param(ParamSpec::string("manufacturer_name"))
            .param(ParamSpec::string("route").describe("Route of administration, e.g. ORAL"))
            .param(limit())
            .param(skip()),
        ),
        RestEndpoint::new(
            "/drug/drugsfda.json",
            ToolSpec::new(
                "search_drug_approvals",
                "Search Drugs@FDA application and approval history.",
            )
            .param(ParamSpec::string("sponsor_name"))
            .param(ParamSpec::string("brand_name"))
            .param(ParamSpec::string("application_number").describe("NDA/ANDA/BLA number, e.g. NDA021436"))
            .param(limit())
            .param(skip()),
        ),
        RestEndpoint::new(
            "/device/enforcement.json",
            ToolSpec::new(
                "search_device_recalls",
                "Search FDA medical device recall enforcement reports.",
            )
            .param(classification())
            .param(status())
            .param(recalling_firm())
            .param(ParamSpec::string("product_description"))
            .param(limit())
            .param(skip()),
        ),
        RestEndpoint::new(
            "/food/enforcement.json",
            ToolSpec::new(
                "search_food_recalls",
                "Search FDA food recall enforcement reports.",
            )
            .param(classification())
            .param(status())
            .param(recalling_firm())
            .param(ParamSpec::string("reason_for_recall"))
            .param(ParamSpec::string("state"))
            .param(limit())
            .param(skip()),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ToolRegistry;

    #[test]
    fn catalog_is_valid() {
        let specs: Vec<ToolSpec> = endpoints().into_iter().map(|e| e.spec).collect();
        let registry = ToolRegistry::new(specs).unwrap();
        assert_eq!(registry.len(), 6);
        assert!(registry.get("search_drug_recalls").is_some());
    }

    #[test]
    fn only_limit_has_a_default() {
        for endpoint in endpoints() {
            let defaulted: Vec<&str> = endpoint
                .spec
                .params
                .iter()
                .filter(|p| p.default.is_some())
                .map(|p| p.name.as_str())
                .collect();
            assert_eq!(defaulted, ["limit"], "{}", endpoint.spec.name);
        }
    }
}
