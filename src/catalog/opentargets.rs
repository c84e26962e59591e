//! Open Targets Platform tool catalog (GraphQL backend).
//!
//! Parameter names equal the GraphQL variable names so validated arguments
//! become the `variables` object verbatim.

use crate::backend::graphql::GraphqlOperation;
use crate::schema::{ParamSpec, ToolSpec};

pub const INSTRUCTIONS: &str = "Open Targets Platform gateway. Start with `search_entities` to \
resolve free text (gene symbols, disease names, drug names) to identifiers: Ensembl gene ids \
(ENSG...) for targets, EFO/MONDO ids for diseases and ChEMBL ids for drugs. Then call the \
target, disease or drug tools with those ids; `map_ids` resolves several terms at once. \
Association and adverse-event tools are paged with `pageIndex` and `pageSize`; evidence is paged \
by passing back the returned `cursor`.";

const SEARCH_ENTITIES: &str = r#"
query SearchEntities($queryString: String!, $entityNames: [String!], $pageIndex: Int!, $pageSize: Int!) {
  search(queryString: $queryString, entityNames: $entityNames, page: {index: $pageIndex, size: $pageSize}) {
    total
    hits {
      id
      entity
      name
      description
      score
      object {
        __typename
        ... on Target { id approvedSymbol approvedName biotype }
        ... on Disease { id name description therapeuticAreas { id name } }
        ... on Drug { id name drugType maximumClinicalTrialPhase isApproved }
      }
    }
  }
}
"#;

const TARGET_INFO: &str = r#"
query TargetInfo($ensemblId: String!) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    approvedName
    biotype
    functionDescriptions
    synonyms { label source }
    genomicLocation { chromosome start end strand }
    proteinIds { id source }
  }
}
"#;

const TARGET_ASSOCIATED_DISEASES: &str = r#"
query TargetAssociatedDiseases($ensemblId: String!, $pageIndex: Int!, $pageSize: Int!) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    associatedDiseases(page: {index: $pageIndex, size: $pageSize}) {
      count
      rows {
        disease { id name description therapeuticAreas { id name } }
        score
        datatypeScores { id score }
      }
    }
  }
}
"#;

const DISEASE_INFO: &str = r#"
query DiseaseInfo($efoId: String!) {
  disease(efoId: $efoId) {
    id
    name
    description
    synonyms { relation terms }
    therapeuticAreas { id name }
    dbXRefs
  }
}
"#;

const DISEASE_ASSOCIATED_TARGETS: &str = r#"
query DiseaseAssociatedTargets($efoId: String!, $pageIndex: Int!, $pageSize: Int!) {
  disease(efoId: $efoId) {
    id
    name
    associatedTargets(page: {index: $pageIndex, size: $pageSize}) {
      count
      rows {
        target { id approvedSymbol approvedName biotype }
        score
        datatypeScores { id score }
      }
    }
  }
}
"#;

const DRUG_INFO: &str = r#"
query DrugInfo($chemblId: String!) {
  drug(chemblId: $chemblId) {
    id
    name
    synonyms
    tradeNames
    drugType
    description
    isApproved
    hasBeenWithdrawn
    blackBoxWarning
    yearOfFirstApproval
    maximumClinicalTrialPhase
    mechanismsOfAction {
      rows {
        mechanismOfAction
        targetName
        actionType
        targets { id approvedSymbol }
      }
    }
    indications {
      count
      rows {
        disease { id name }
        maxPhaseForIndication
      }
    }
  }
}
"#;

const TARGET_SAFETY: &str = r#"
query TargetSafety($ensemblId: String!) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    safetyLiabilities {
      event
      eventId
      effects { direction dosing }
      datasource
    }
  }
}
"#;

const TARGET_KNOWN_DRUGS: &str = r#"
query TargetKnownDrugs($ensemblId: String!, $size: Int!) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    knownDrugs(size: $size) {
      count
      rows {
        drugId
        targetId
        drug { id name drugType maximumClinicalTrialPhase isApproved description }
        mechanismOfAction
        disease { id name }
        phase
        status
        urls { name url }
      }
    }
  }
}
"#;

const TARGET_TRACTABILITY: &str = r#"
query TargetTractability($ensemblId: String!) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    tractability { modality value label }
  }
}
"#;

const TARGET_DISEASE_EVIDENCE: &str = r#"
query TargetDiseaseEvidence($ensemblId: String!, $efoId: String!, $datasourceIds: [String!], $size: Int!, $cursor: String) {
  target(ensemblId: $ensemblId) {
    id
    approvedSymbol
    evidences(efoIds: [$efoId], datasourceIds: $datasourceIds, size: $size, cursor: $cursor) {
      count
      cursor
      rows {
        id
        score
        datasourceId
        datatypeId
        diseaseFromSource
        targetFromSourceId
        disease { id name }
        target { id approvedSymbol }
        literature
      }
    }
  }
}
"#;

const DRUG_WARNINGS: &str = r#"
query DrugWarnings($chemblId: String!) {
  drug(chemblId: $chemblId) {
    id
    name
    hasBeenWithdrawn
    blackBoxWarning
    drugWarnings {
      warningType
      description
      toxicityClass
      country
      year
      efoId
      efoTerm
      efoIdForWarningClass
      references { id source url }
      chemblIds
    }
  }
}
"#;

const DRUG_ADVERSE_EVENTS: &str = r#"
query DrugAdverseEvents($chemblId: String!, $pageIndex: Int!, $pageSize: Int!) {
  drug(chemblId: $chemblId) {
    id
    name
    adverseEvents(page: {index: $pageIndex, size: $pageSize}) {
      count
      criticalValue
      rows { meddraCode name count logLR }
    }
  }
}
"#;

const VARIANT_INFO: &str = r#"
query VariantInfo($variantId: String!) {
  variant(variantId: $variantId) {
    id
    variantDescription
    chromosome
    position
    referenceAllele
    alternateAllele
    hgvsId
    rsIds
    dbXrefs { id source }
    alleleFrequencies { populationName alleleFrequency }
    mostSevereConsequence { id label }
    transcriptConsequences {
      transcriptId
      aminoAcidChange
      impact
      isEnsemblCanonical
      target { id approvedSymbol }
      variantConsequences { id label }
    }
  }
}
"#;

const MAP_IDS: &str = r#"
query MapIds($queryTerms: [String!]!, $entityNames: [String!]) {
  mapIds(queryTerms: $queryTerms, entityNames: $entityNames) {
    total
    mappings {
      term
      hits { id name entity category score }
    }
  }
}
"#;

fn page_index() -> ParamSpec {
    ParamSpec::integer("pageIndex")
        .range(0.0, 10_000.0)
        .default_value(0)
        .describe("Zero-based page number")
}

fn page_size() -> ParamSpec {
    ParamSpec::integer("pageSize")
        .range(1.0, 100.0)
        .default_value(10)
        .describe("Rows per page (1-100)")
}

fn ensembl_id() -> ParamSpec {
    ParamSpec::string("ensemblId")
        .required()
        .describe("Ensembl gene id of the target, e.g. ENSG00000157764")
}

fn efo_id() -> ParamSpec {
    ParamSpec::string("efoId")
        .required()
        .describe("Disease id, e.g. EFO_0000249 or MONDO_0004975")
}

fn chembl_id() -> ParamSpec {
    ParamSpec::string("chemblId")
        .required()
        .describe("ChEMBL id of the drug, e.g. CHEMBL1201583")
}

fn entity_names() -> ParamSpec {
    ParamSpec::string_list("entityNames")
        .describe("Restrict hits to these entity types: target, disease, drug")
}

pub fn operations() -> Vec<GraphqlOperation> {
    vec![
        GraphqlOperation::new(
            SEARCH_ENTITIES,
            ToolSpec::new(
                "search_entities",
                "Search targets, diseases and drugs by free text and resolve them to platform ids.",
            )
            .param(
                ParamSpec::string("queryString")
                    .required()
                    .describe("Free-text term such as 'BRAF' or 'melanoma'"),
            )
            .param(entity_names())
            .param(page_index())
            .param(page_size()),
        ),
        GraphqlOperation::new(
            TARGET_INFO,
            ToolSpec::new(
                "get_target_info",
                "Core identity of a target gene: symbol, name, biotype, location, protein ids.",
            )
            .param(ensembl_id()),
        ),
        GraphqlOperation::new(
            TARGET_ASSOCIATED_DISEASES,
            ToolSpec::new(
                "get_target_associated_diseases",
                "Diseases associated with a target, ranked by overall association score.",
            )
            .param(ensembl_id())
            .param(page_index())
            .param(page_size()),
        ),
        GraphqlOperation::new(
            DISEASE_INFO,
            ToolSpec::new(
                "get_disease_info",
                "Disease description, synonyms, therapeutic areas and cross-references.",
            )
            .param(efo_id()),
        ),
        GraphqlOperation::new(
            DISEASE_ASSOCIATED_TARGETS,
            ToolSpec::new(
                "get_disease_associated_targets",
                "Targets associated with a disease, ranked by overall association score.",
            )
            .param(efo_id())
            .param(page_index())
            .param(page_size()),
        ),
        GraphqlOperation::new(
            DRUG_INFO,
            ToolSpec::new(
                "get_drug_info",
                "Drug identity, approval status, mechanisms of action and indications.",
            )
            .param(chembl_id()),
        ),
        GraphqlOperation::new(
            TARGET_SAFETY,
            ToolSpec::new(
                "get_target_safety",
                "Known safety liabilities of a target with effect direction and data source.",
            )
            .param(ensembl_id()),
        ),
        GraphqlOperation::new(
            TARGET_KNOWN_DRUGS,
            ToolSpec::new(
                "get_target_known_drugs",
                "Drugs acting on a target with mechanism, indication, trial phase and status.",
            )
            .param(ensembl_id())
            .param(
                ParamSpec::integer("size")
                    .range(1.0, 100.0)
                    .default_value(25)
                    .describe("Maximum drug rows (1-100)"),
            ),
        ),
        GraphqlOperation::new(
            TARGET_TRACTABILITY,
            ToolSpec::new(
                "get_target_tractability",
                "Tractability assessments of a target per modality (small molecule, antibody, PROTAC, other).",
            )
            .param(ensembl_id()),
        ),
        GraphqlOperation::new(
            TARGET_DISEASE_EVIDENCE,
            ToolSpec::new(
                "get_target_disease_evidence",
                "Individual evidence rows linking a target to a disease. Page onward with the returned cursor.",
            )
            .param(ensembl_id())
            .param(efo_id())
            .param(
                ParamSpec::string_list("datasourceIds")
                    .describe("Only these data sources, e.g. eva, chembl, ot_genetics_portal"),
            )
            .param(
                ParamSpec::integer("size")
                    .range(1.0, 100.0)
                    .default_value(10)
                    .describe("Evidence rows per page (1-100)"),
            )
            .param(
                ParamSpec::string("cursor")
                    .describe("Cursor returned by the previous page; omit for the first page"),
            ),
        ),
        GraphqlOperation::new(
            DRUG_WARNINGS,
            ToolSpec::new(
                "get_drug_warnings",
                "Withdrawal and black-box warnings of a drug with toxicity class and references.",
            )
            .param(chembl_id()),
        ),
        GraphqlOperation::new(
            DRUG_ADVERSE_EVENTS,
            ToolSpec::new(
                "get_drug_adverse_events",
                "Significant adverse events reported for a drug (FAERS), ranked by log-likelihood ratio.",
            )
            .param(chembl_id())
            .param(page_index())
            .param(page_size()),
        ),
        GraphqlOperation::new(
            VARIANT_INFO,
            ToolSpec::new(
                "get_variant_info",
                "Variant position, alleles, frequencies and predicted transcript consequences.",
            )
            .param(
                ParamSpec::string("variantId")
                    .required()
                    .describe("Variant id as CHROM_POS_REF_ALT, e.g. 19_44908822_C_T"),
            ),
        ),
        GraphqlOperation::new(
            MAP_IDS,
            ToolSpec::new(
                "map_ids",
                "Map several free-text terms to platform ids in one call.",
            )
            .param(
                ParamSpec::string_list("queryTerms")
                    .required()
                    .describe("Terms to resolve, e.g. [\"BRAF\", \"melanoma\"]"),
            )
            .param(entity_names()),
        ),
    ]
}
