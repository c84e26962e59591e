//! OpenGenes tool catalog (SQL backend).
//!
//! Tool names here are unprefixed; the backend prepends the configured
//! prefix (`opengenes_` by default).

use serde_json::{Value, json};

use crate::backend::BindMode;
use crate::backend::sql::{Filter, SelectTemplate, SqlRoute, SqlTool};
use crate::schema::{ParamSpec, ToolSpec};

pub const INSTRUCTIONS: &str = "OpenGenes gateway: a read-only SQLite database of genes involved \
in longevity, lifespan-extension experiments on model organisms, aging hallmarks and human \
longevity associations. Call `get_schema_info` and `example_queries` before writing SQL for \
`db_query`; only single SELECT statements are accepted.";

const DB_QUERY_DESCRIPTION: &str = "Query the OpenGenes database that contains data about genes \
involved in longevity, lifespan extension experiments on model organisms, and changes in human \
and other organisms with aging. Only a single read-only SELECT statement is accepted. Before \
calling this tool the first time, check the schema information and example query tools.";

pub const SCHEMA_SUMMARY: &str = "OpenGenes Database Schema Summary

1. lifespan_change
   - Experimental data about genetic interventions and their effects on lifespan
   - Key columns: HGNC (gene symbol), model_organism, sex, effect_on_lifespan
   - Lifespan measurements: lifespan_percent_change_mean, lifespan_percent_change_max
   - Multi-value columns: intervention_improves, intervention_deteriorates

2. gene_criteria
   - Aging-related criteria classifications per gene (12 categories)
   - Key columns: HGNC, criteria

3. gene_hallmarks
   - Hallmarks of aging associated with each gene
   - Key columns: HGNC, \"hallmarks of aging\" (comma-separated, query with LIKE)

4. longevity_associations
   - Genetic variants associated with longevity in human populations
   - Key columns: HGNC, \"polymorphism id\", ethnicity, \"study type\"

All tables are linked by HGNC gene symbols.";

pub const DB_PROMPT: &str = "Guidelines for querying the OpenGenes database

- Use the HGNC column for gene symbols (TP53, FOXO3, MTOR, ...).
- Columns with spaces must be double-quoted: \"hallmarks of aging\", \"study type\".
- gene_hallmarks.\"hallmarks of aging\", lifespan_change.intervention_improves and
  lifespan_change.intervention_deteriorates hold comma-separated values: always match them
  with LIKE '%term%'.
- Order lifespan results by magnitude: DESC for increases, ASC for decreases.
- When asked about lifespan effects without mean vs max, show both
  lifespan_percent_change_mean and lifespan_percent_change_max and order by
  COALESCE(lifespan_percent_change_mean, lifespan_percent_change_max).
- For evidence linking a gene to aging, query all four tables: gene_criteria,
  gene_hallmarks, lifespan_change and longevity_associations.
- Use LIMIT only when a \"top N\" answer is requested.
- Only SELECT statements are accepted; the database is opened read-only.";

const EFFECTS_ON_LIFESPAN: &[&str] = &[
    "increases lifespan",
    "no change",
    "decreases lifespan",
    "increases lifespan in animals with decreased lifespans",
    "decreases survival under stress conditions",
    "improves survival under stress conditions",
    "decreases life span in animals with increased lifespans",
    "no change under stress conditions",
];

fn schema_info() -> Value {
    json!({
        "database_overview": {
            "description": "OpenGenes contains aging and lifespan research data in 4 tables linked by HGNC gene symbols",
            "total_tables": 4,
            "primary_key": "HGNC (gene symbol) links all tables together"
        },
        "critical_query_guidelines": {
            "multi_value_fields": {
                "description": "Some columns contain comma-separated values. Always use LIKE with wildcards for them.",
                "fields": [
                    "gene_hallmarks.\"hallmarks of aging\"",
                    "lifespan_change.intervention_deteriorates",
                    "lifespan_change.intervention_improves"
                ],
                "example_syntax": "WHERE \"hallmarks of aging\" LIKE '%stem cell exhaustion%'"
            },
            "lifespan_metrics": "Show both lifespan_percent_change_mean and lifespan_percent_change_max unless one is asked for; order by COALESCE of the two",
            "result_ordering": "DESC for lifespan extension, ASC for lifespan reduction",
            "gene_queries": "Use the HGNC column for gene symbols",
            "safety": "Only SELECT queries are allowed"
        },
        "tables": {
            "lifespan_change": {
                "purpose": "Experimental data on how gene modifications affect lifespan in model organisms",
                "columns": {
                    "HGNC": "Gene symbol",
                    "model_organism": "Organism used for the experiment",
                    "sex": "Sex of the organisms",
                    "effect_on_lifespan": "Direction of lifespan change",
                    "lifespan_percent_change_mean": "Mean percent change in lifespan",
                    "lifespan_percent_change_max": "Maximum percent change in lifespan",
                    "lifespan_percent_change_median": "Median percent change in lifespan",
                    "significance_mean": "Significance of the mean change",
                    "significance_max": "Significance of the maximum change",
                    "intervention_method": "How the gene was modified (knockout, overexpression, ...)",
                    "intervention_improves": "MULTI-VALUE: processes that improved",
                    "intervention_deteriorates": "MULTI-VALUE: processes that deteriorated",
                    "main_effect_on_lifespan": "Gain, loss or switch of function"
                }
            },
            "gene_criteria": {
                "purpose": "Aging-related criteria that genes meet",
                "columns": { "HGNC": "Gene symbol", "criteria": "Criterion met by the gene" }
            },
            "gene_hallmarks": {
                "purpose": "Links genes to hallmarks of aging",
                "columns": {
                    "HGNC": "Gene symbol",
                    "hallmarks of aging": "MULTI-VALUE: comma-separated aging hallmarks"
                }
            },
            "longevity_associations": {
                "purpose": "Population genetics data on variants associated with longevity",
                "columns": {
                    "HGNC": "Gene symbol",
                    "polymorphism type": "SNP, In/Del, VNTR, ...",
                    "polymorphism id": "Variant identifier such as an rs number",
                    "nucleotide substitution": "DNA change",
                    "amino acid substitution": "Protein change",
                    "ethnicity": "Ethnicity of study participants",
                    "study type": "GWAS, candidate genes, meta-analysis, ...",
                    "sex": "Sex of participants",
                    "doi": "Publication DOI",
                    "pmid": "PubMed id"
                }
            }
        },
        "enumerations": {
            "lifespan_change.effect_on_lifespan": EFFECTS_ON_LIFESPAN,
            "lifespan_change.main_effect_on_lifespan": ["loss of function", "switch of function", "gain of function"],
            "lifespan_change.model_organism": [
                "mouse", "roundworm Caenorhabditis elegans", "fly Drosophila melanogaster",
                "rabbit", "rat", "yeasts", "fish Nothobranchius furzeri", "hamster", "zebrafish"
            ]
        }
    })
}

fn example_queries() -> Value {
    json!([
        {
            "category": "Lifespan effects",
            "description": "Genes that increase lifespan, greatest extension first",
            "query": "SELECT HGNC, model_organism, effect_on_lifespan, lifespan_percent_change_mean FROM lifespan_change WHERE effect_on_lifespan = 'increases lifespan' AND lifespan_percent_change_mean IS NOT NULL ORDER BY lifespan_percent_change_mean DESC"
        },
        {
            "category": "Lifespan effects",
            "description": "Both mean and maximum lifespan change",
            "query": "SELECT HGNC, model_organism, lifespan_percent_change_mean, lifespan_percent_change_max FROM lifespan_change WHERE effect_on_lifespan = 'increases lifespan' ORDER BY COALESCE(lifespan_percent_change_mean, lifespan_percent_change_max) DESC"
        },
        {
            "category": "Multi-value fields",
            "description": "Genes associated with stem cell exhaustion",
            "query": "SELECT HGNC, \"hallmarks of aging\" FROM gene_hallmarks WHERE \"hallmarks of aging\" LIKE '%stem cell exhaustion%'"
        },
        {
            "category": "Multi-value fields",
            "description": "Interventions that improve the cardiovascular system",
            "query": "SELECT HGNC, intervention_improves, lifespan_percent_change_mean FROM lifespan_change WHERE intervention_improves LIKE '%cardiovascular system%' ORDER BY lifespan_percent_change_mean DESC"
        },
        {
            "category": "Cross-table analysis",
            "description": "Genes with both experimental lifespan effects and human longevity associations",
            "query": "SELECT DISTINCT lc.HGNC, lc.effect_on_lifespan, la.ethnicity, la.\"study type\" FROM lifespan_change lc INNER JOIN longevity_associations la ON lc.HGNC = la.HGNC WHERE lc.effect_on_lifespan = 'increases lifespan'"
        },
        {
            "category": "Cross-table analysis",
            "description": "Aging criteria for a gene (repeat for the other three tables for full evidence)",
            "query": "SELECT criteria FROM gene_criteria WHERE HGNC = 'PTEN'"
        },
        {
            "category": "Population genetics",
            "description": "All longevity polymorphisms for a gene",
            "query": "SELECT HGNC, \"polymorphism type\", \"polymorphism id\", \"nucleotide substitution\", ethnicity, \"study type\" FROM longevity_associations WHERE HGNC = 'FOXO3'"
        },
        {
            "category": "Summary statistics",
            "description": "Top genes by number of experiments",
            "query": "SELECT HGNC, COUNT(*) AS experiment_count, COUNT(DISTINCT model_organism) AS organism_count FROM lifespan_change WHERE HGNC IS NOT NULL GROUP BY HGNC ORDER BY experiment_count DESC LIMIT 10"
        }
    ])
}

fn gene(required: bool) -> ParamSpec {
    let p = ParamSpec::string("gene").describe("HGNC gene symbol, e.g. FOXO3");
    if required { p.required() } else { p }
}

fn limit() -> ParamSpec {
    ParamSpec::integer("limit")
        .range(1.0, 500.0)
        .default_value(50)
        .describe("Maximum number of rows (1-500)")
}

pub fn tools() -> Vec<SqlTool> {
    vec![
        SqlTool::new(
            ToolSpec::new("get_schema_info", "Get information about the database schema"),
            SqlRoute::Static(schema_info()),
        ),
        SqlTool::new(
            ToolSpec::new("example_queries", "Get a list of example SQL queries"),
            SqlRoute::Static(example_queries()),
        ),
        SqlTool::new(
            ToolSpec::new("db_query", DB_QUERY_DESCRIPTION).param(
                ParamSpec::string("sql")
                    .required()
                    .describe("A single SELECT statement"),
            ),
            SqlRoute::Raw { param: "sql" },
        ),
        SqlTool::new(
            ToolSpec::new(
                "lifespan_by_gene",
                "Lifespan experiments for a gene, largest effect first.",
            )
            .param(gene(true))
            .param(ParamSpec::string("model_organism").describe("Substring of the organism name, e.g. 'mouse'"))
            .param(ParamSpec::one_of("effect_on_lifespan", EFFECTS_ON_LIFESPAN))
            .param(limit()),
            SqlRoute::Select(SelectTemplate {
                select: "SELECT HGNC, model_organism, sex, effect_on_lifespan, \
                         lifespan_percent_change_mean, lifespan_percent_change_max, \
                         intervention_method FROM lifespan_change",
                filters: vec![
                    Filter::new("gene", "HGNC", BindMode::Exact),
                    Filter::new("model_organism", "model_organism", BindMode::Contains),
                    Filter::new("effect_on_lifespan", "effect_on_lifespan", BindMode::Exact),
                ],
                order_by: Some(
                    "ABS(COALESCE(lifespan_percent_change_mean, lifespan_percent_change_max)) DESC",
                ),
                limit_param: Some("limit"),
            }),
        ),
        SqlTool::new(
            ToolSpec::new(
                "gene_hallmarks",
                "Hallmarks of aging linked to genes; filter by gene, hallmark, or both.",
            )
            .param(gene(false))
            .param(ParamSpec::string("hallmark").describe("Substring of a hallmark, e.g. 'stem cell exhaustion'"))
            .param(limit()),
            SqlRoute::Select(SelectTemplate {
                select: "SELECT HGNC, \"hallmarks of aging\" FROM gene_hallmarks",
                filters: vec![
                    Filter::new("gene", "HGNC", BindMode::Exact),
                    Filter::new("hallmark", "\"hallmarks of aging\"", BindMode::Contains),
                ],
                order_by: Some("HGNC"),
                limit_param: Some("limit"),
            }),
        ),
        SqlTool::new(
            ToolSpec::new(
                "longevity_associations",
                "Human genetic variants associated with longevity for a gene.",
            )
            .param(gene(true))
            .param(ParamSpec::string("ethnicity").describe("Substring of the study population ethnicity"))
            .param(limit()),
            SqlRoute::Select(SelectTemplate {
                select: "SELECT HGNC, \"polymorphism type\", \"polymorphism id\", \
                         \"nucleotide substitution\", \"amino acid substitution\", ethnicity, \
                         \"study type\", pmid FROM longevity_associations",
                filters: vec![
                    Filter::new("gene", "HGNC", BindMode::Exact),
                    Filter::new("ethnicity", "ethnicity", BindMode::Contains),
                ],
                order_by: None,
                limit_param: Some("limit"),
            }),
        ),
    ]
}
