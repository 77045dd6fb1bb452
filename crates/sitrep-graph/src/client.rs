//! Bolt connection wrapper and schema initialization.

use neo4rs::{Graph, Query};
use tracing::{debug, info};

use sitrep_core::config::Neo4jConfig;
use sitrep_core::error::{Error, Result};

/// Typed access to the property graph.
///
/// One client per process; `neo4rs` pools bolt connections internally. All
/// adapter operations (asset upserts, CVE store, hierarchy sync, centrality,
/// cleaner) are implemented on this type across the crate's modules.
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to the graph store.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        let graph = Graph::new(&config.bolt, &config.user, &config.password)
            .await
            .map_err(|e| Error::StoreTransient(format!("bolt connection failed: {e}")))?;
        info!(bolt = %config.bolt, "graph store connected");
        Ok(GraphClient { graph })
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run a write query, mapping driver errors into the store taxonomy.
    pub(crate) async fn run(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.map_err(store_err)
    }

    /// Run several write queries in one transaction.
    pub(crate) async fn run_in_txn(&self, queries: Vec<Query>) -> Result<()> {
        let mut txn = self.graph.start_txn().await.map_err(store_err)?;
        txn.run_queries(queries).await.map_err(store_err)?;
        txn.commit().await.map_err(store_err)
    }

    /// Idempotently apply uniqueness constraints and indices.
    ///
    /// "Equivalent schema rule already exists" races are treated as success;
    /// the two default subnets are bootstrapped here as well.
    pub async fn init_schema(&self) -> Result<()> {
        let constraints = [
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Contact) REQUIRE n.name IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:IP) REQUIRE n.address IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:OrganizationUnit) REQUIRE n.name IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Subnet) REQUIRE n.range IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:CVE) REQUIRE n.cve_id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Vulnerability) REQUIRE n.description IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Mission) REQUIRE n.name IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Component) REQUIRE n.name IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Host) REQUIRE n.hostname IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Device) REQUIRE n.name IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:DomainName) REQUIRE (n.domain_name, n.tag) IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:NetworkService) REQUIRE (n.service, n.tag) IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:SoftwareVersion) REQUIRE (n.version, n.tag) IS UNIQUE",
        ];
        let indices = [
            "CREATE INDEX IF NOT EXISTS FOR (n:IP) ON (n.version, n.address)",
            "CREATE INDEX IF NOT EXISTS FOR (n:Subnet) ON (n.version, n.range)",
        ];

        for statement in constraints.iter().chain(indices.iter()) {
            debug!(statement, "applying schema statement");
            match self.graph.run(neo4rs::query(statement)).await {
                Ok(()) => {}
                Err(e) if is_already_exists(&e) => {}
                Err(e) => return Err(store_err(e)),
            }
        }

        self.run(neo4rs::query(
            "MERGE (s:Subnet {range: '0.0.0.0/0'}) SET s.version = 4",
        ))
        .await?;
        self.run(neo4rs::query(
            "MERGE (s:Subnet {range: '::/0'}) SET s.version = 6",
        ))
        .await?;

        info!("graph schema initialized");
        Ok(())
    }
}

fn is_already_exists(err: &neo4rs::Error) -> bool {
    let text = err.to_string();
    text.contains("already exists") || text.contains("EquivalentSchemaRule")
}

/// Map a driver error onto the store taxonomy: constraint violations are the
/// caller's bad input, everything else is treated as transient.
pub(crate) fn store_err(err: neo4rs::Error) -> Error {
    let text = err.to_string();
    if text.contains("ConstraintValidation") || text.contains("constraint") {
        Error::StoreConstraint(text)
    } else {
        Error::StoreTransient(text)
    }
}
