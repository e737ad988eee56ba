//! Relationship joins inferred from foreign keys
//!
//! For every requested join edge `t1 -> t2` the relationship is classified
//! as belongs-to (t1 references t2), has-many (t2 references t1) or
//! has-and-belongs-to-many (a third table references both). Related rows are
//! fetched with one `IN` query per edge, deeper joins are resolved on them
//! first, and they are then folded back into the parent rows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use records_common::error::Result;
use records_common::types::Record;

use crate::columns::ColumnIncluder;
use crate::condition::{ColumnOperator, Condition};
use crate::db::GenericDb;
use crate::ordering::{OrderColumn, OrderingInfo};
use crate::params::QueryParams;
use crate::path_tree::PathTree;
use crate::reflection::{ReflectedTable, SchemaView};

/// Requested join paths, one branch per joined table
#[derive(Debug, Clone, Default)]
pub struct JoinPaths {
    tree: PathTree<()>,
}

impl JoinPaths {
    /// Read `join=t2[,t3...]` parameters
    #[must_use]
    pub fn from_params(params: &QueryParams) -> Self {
        let mut tree = PathTree::new();
        for join in params.get("join") {
            let path: Vec<&str> = join
                .split(',')
                .map(str::trim)
                .filter(|table| !table.is_empty())
                .collect();
            tree.ensure(&path);
        }
        Self { tree }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Table names along every requested path
    #[must_use]
    pub fn paths(&self) -> Vec<Vec<String>> {
        if self.is_empty() {
            return vec![];
        }
        self.tree.paths()
    }

    fn root(&self) -> JoinLevel<'_> {
        JoinLevel(&self.tree)
    }
}

/// Tables joined at one depth below a parent table
#[derive(Debug, Clone, Copy)]
struct JoinLevel<'t>(&'t PathTree<()>);

impl<'t> JoinLevel<'t> {
    fn tables(self) -> impl Iterator<Item = (&'t str, JoinLevel<'t>)> {
        self.0.branches().map(|(table, tree)| (table, JoinLevel(tree)))
    }
}

/// Junction rows of a many-to-many join
///
/// `pk_values` lists, per parent key, the far-side keys reached through the
/// junction; `fk_values` maps each far-side key to its fetched record.
#[derive(Debug, Default)]
struct HabtmValues {
    pk_values: BTreeMap<String, Vec<String>>,
    fk_values: HashMap<String, Option<Record>>,
}

/// Resolves `join` parameters for already fetched records
pub struct RelationJoiner<'a> {
    db: &'a GenericDb,
    schema: SchemaView<'a>,
    columns: ColumnIncluder,
    ordering: OrderingInfo,
    max_records: usize,
}

impl<'a> RelationJoiner<'a> {
    /// Joiner fetching at most `max_records` rows per to-many edge (0 = no cap)
    #[must_use]
    pub fn new(db: &'a GenericDb, schema: SchemaView<'a>, max_records: usize) -> Self {
        Self {
            db,
            schema,
            columns: ColumnIncluder,
            ordering: OrderingInfo,
            max_records,
        }
    }

    /// Force-include every key column the requested joins depend on
    ///
    /// # Errors
    /// Returns a database error when reflection fails.
    pub async fn add_mandatory_columns(
        &self,
        table: &Arc<ReflectedTable>,
        params: &mut QueryParams,
    ) -> Result<()> {
        let paths = JoinPaths::from_params(params).paths();
        if paths.is_empty() {
            return Ok(());
        }
        let mut mandatory = Vec::new();
        for path in paths {
            let mut t1 = table.clone();
            for name in path {
                let Some(t2) = self.schema.get_table(&name).await? else {
                    break;
                };
                let fks1 = t1.fks_to(t2.name());
                let fks2 = t2.fks_to(t1.name());
                let junction = if fks1.is_empty() && fks2.is_empty() {
                    self.junction_table(&t1, &t2).await?
                } else {
                    None
                };
                let habtm = junction.is_some();
                if habtm || !fks1.is_empty() {
                    if let Some(pk) = t2.pk() {
                        mandatory.push(format!("{}.{}", t2.name(), pk.name));
                    }
                }
                for fk in &fks1 {
                    mandatory.push(format!("{}.{}", t1.name(), fk.name));
                }
                if habtm || !fks2.is_empty() {
                    if let Some(pk) = t1.pk() {
                        mandatory.push(format!("{}.{}", t1.name(), pk.name));
                    }
                }
                for fk in &fks2 {
                    mandatory.push(format!("{}.{}", t2.name(), fk.name));
                }
                t1 = t2;
            }
        }
        mandatory.sort();
        mandatory.dedup();
        for column in mandatory {
            params.add("mandatory", column);
        }
        Ok(())
    }

    /// Attach the joined records of every requested path to `records`
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn add_joins(
        &self,
        table: &Arc<ReflectedTable>,
        records: &mut Vec<Record>,
        params: &QueryParams,
    ) -> Result<()> {
        let joins = JoinPaths::from_params(params);
        if joins.is_empty() || records.is_empty() {
            return Ok(());
        }
        self.join_level(table.clone(), joins.root(), records, params)
            .await
    }

    fn join_level<'s>(
        &'s self,
        t1: Arc<ReflectedTable>,
        level: JoinLevel<'s>,
        records: &'s mut Vec<Record>,
        params: &'s QueryParams,
    ) -> BoxFuture<'s, Result<()>> {
        async move {
            for (name, deeper) in level.tables() {
                let Some(t2) = self.schema.get_table(name).await? else {
                    continue;
                };
                let belongs_to = !t1.fks_to(t2.name()).is_empty();
                let has_many = !t2.fks_to(t1.name()).is_empty();
                let junction = if belongs_to || has_many {
                    None
                } else {
                    self.junction_table(&t1, &t2).await?
                };
                debug!(
                    from = t1.name(),
                    to = t2.name(),
                    belongs_to,
                    has_many,
                    junction = junction.as_ref().map(|t3| t3.name()),
                    "Joining"
                );

                let mut fk_values = None;
                let mut pk_values = None;
                let mut habtm_values = None;
                let mut new_records = Vec::new();

                if belongs_to && t2.pk().is_some() {
                    let values = fk_empty_values(&t1, &t2, records);
                    new_records.extend(self.fetch_by_keys(&t2, &values, params).await?);
                    fk_values = Some(values);
                }
                if has_many && t1.pk().is_some() {
                    let values = pk_empty_values(&t1, records);
                    new_records.extend(self.fetch_children(&t1, &t2, &values, params).await?);
                    pk_values = Some(values);
                }
                if let Some(t3) = junction.filter(|_| t1.pk().is_some() && t2.pk().is_some()) {
                    let values = self.habtm_empty_values(&t1, &t2, &t3, records).await?;
                    new_records.extend(self.fetch_by_keys(&t2, &values.fk_values, params).await?);
                    habtm_values = Some(values);
                }

                self.join_level(t2.clone(), deeper, &mut new_records, params)
                    .await?;

                if let Some(mut values) = fk_values {
                    fill_fk_values(&t2, &new_records, &mut values);
                    set_fk_values(&t1, &t2, records, &values);
                }
                if let Some(values) = pk_values {
                    let values = fill_pk_values(&t1, &t2, &new_records, values);
                    set_pk_values(&t1, &t2, records, &values);
                }
                if let Some(mut values) = habtm_values {
                    fill_fk_values(&t2, &new_records, &mut values.fk_values);
                    set_habtm_values(&t1, &t2, records, &values);
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// First table, by name, referencing both `t1` and `t2`
    async fn junction_table(
        &self,
        t1: &ReflectedTable,
        t2: &ReflectedTable,
    ) -> Result<Option<Arc<ReflectedTable>>> {
        for name in self.schema.table_names().await? {
            let Some(t3) = self.schema.get_table(&name).await? else {
                continue;
            };
            if !t3.fks_to(t1.name()).is_empty() && !t3.fks_to(t2.name()).is_empty() {
                return Ok(Some(t3));
            }
        }
        Ok(None)
    }

    /// Rows of `t2` whose primary key is one of the keys of `values`
    async fn fetch_by_keys(
        &self,
        t2: &ReflectedTable,
        values: &HashMap<String, Option<Record>>,
        params: &QueryParams,
    ) -> Result<Vec<Record>> {
        if values.is_empty() {
            return Ok(vec![]);
        }
        let mut ids: Vec<String> = values.keys().cloned().collect();
        ids.sort();
        let columns = self.columns.names(t2, false, params);
        self.db
            .select_multiple(t2, &columns, &ids, &self.schema.row_condition(t2))
            .await
    }

    /// Rows of `t2` referencing one of the parent keys
    async fn fetch_children(
        &self,
        t1: &ReflectedTable,
        t2: &ReflectedTable,
        values: &BTreeMap<String, Vec<Record>>,
        params: &QueryParams,
    ) -> Result<Vec<Record>> {
        if values.is_empty() {
            return Ok(vec![]);
        }
        let keys = values.keys().cloned().collect::<Vec<_>>().join(",");
        let references = Condition::any(
            t2.fks_to(t1.name())
                .into_iter()
                .map(|fk| Condition::column(fk, ColumnOperator::In, keys.as_str())),
        );
        let condition = references.and(self.schema.row_condition(t2));
        let columns = self.columns.names(t2, false, params);
        let (ordering, limit) = self.record_cap(t2);
        self.db
            .select_all(t2, &columns, &condition, &ordering, 0, limit)
            .await
    }

    async fn habtm_empty_values(
        &self,
        t1: &ReflectedTable,
        t2: &ReflectedTable,
        t3: &ReflectedTable,
        records: &[Record],
    ) -> Result<HabtmValues> {
        let mut habtm = HabtmValues {
            pk_values: pk_empty_values(t1, records)
                .into_keys()
                .map(|key| (key, Vec::new()))
                .collect(),
            fk_values: HashMap::new(),
        };
        if habtm.pk_values.is_empty() {
            return Ok(habtm);
        }
        let (Some(fk1), Some(fk2)) = (
            t3.fks_to(t1.name()).into_iter().next(),
            t3.fks_to(t2.name()).into_iter().next(),
        ) else {
            return Ok(habtm);
        };
        let keys = habtm.pk_values.keys().cloned().collect::<Vec<_>>().join(",");
        let condition = Condition::column(fk1, ColumnOperator::In, keys)
            .and(self.schema.row_condition(t3));
        let columns = vec![fk1.name.clone(), fk2.name.clone()];
        let (ordering, limit) = self.record_cap(t3);
        let rows = self
            .db
            .select_all(t3, &columns, &condition, &ordering, 0, limit)
            .await?;
        for row in rows {
            let (Some(parent), Some(far)) = (
                row.get(&fk1.name).and_then(key_of),
                row.get(&fk2.name).and_then(key_of),
            ) else {
                continue;
            };
            habtm.pk_values.entry(parent).or_default().push(far.clone());
            habtm.fk_values.insert(far, None);
        }
        Ok(habtm)
    }

    /// Default ordering and row limit while a record cap is active
    fn record_cap(&self, table: &ReflectedTable) -> (Vec<OrderColumn>, Option<u64>) {
        if self.max_records == 0 {
            return (vec![], None);
        }
        (
            self.ordering.default_ordering(table),
            u64::try_from(self.max_records).ok(),
        )
    }
}

/// Map key of a column value; nulls and composite values have none
fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn fk_empty_values(
    t1: &ReflectedTable,
    t2: &ReflectedTable,
    records: &[Record],
) -> HashMap<String, Option<Record>> {
    let mut values = HashMap::new();
    for fk in t1.fks_to(t2.name()) {
        for record in records {
            if let Some(key) = record.get(&fk.name).and_then(key_of) {
                values.insert(key, None);
            }
        }
    }
    values
}

fn pk_empty_values(t1: &ReflectedTable, records: &[Record]) -> BTreeMap<String, Vec<Record>> {
    let Some(pk) = t1.pk() else {
        return BTreeMap::new();
    };
    records
        .iter()
        .filter_map(|record| record.get(&pk.name).and_then(key_of))
        .map(|key| (key, Vec::new()))
        .collect()
}

fn fill_fk_values(
    t2: &ReflectedTable,
    new_records: &[Record],
    values: &mut HashMap<String, Option<Record>>,
) {
    let Some(pk) = t2.pk() else {
        return;
    };
    for record in new_records {
        if let Some(key) = record.get(&pk.name).and_then(key_of) {
            if let Some(slot) = values.get_mut(&key) {
                *slot = Some(record.clone());
            }
        }
    }
}

fn set_fk_values(
    t1: &ReflectedTable,
    t2: &ReflectedTable,
    records: &mut [Record],
    values: &HashMap<String, Option<Record>>,
) {
    for fk in t1.fks_to(t2.name()) {
        for record in records.iter_mut() {
            let Some(key) = record.get(&fk.name).and_then(key_of) else {
                continue;
            };
            if let Some(Some(related)) = values.get(&key) {
                record.insert(fk.name.clone(), Value::Object(related.clone()));
            }
        }
    }
}

fn fill_pk_values(
    t1: &ReflectedTable,
    t2: &ReflectedTable,
    new_records: &[Record],
    mut values: BTreeMap<String, Vec<Record>>,
) -> BTreeMap<String, Vec<Record>> {
    let fks = t2.fks_to(t1.name());
    for record in new_records {
        for fk in &fks {
            let Some(key) = record.get(&fk.name).and_then(key_of) else {
                continue;
            };
            if let Some(children) = values.get_mut(&key) {
                children.push(record.clone());
            }
        }
    }
    values
}

fn set_pk_values(
    t1: &ReflectedTable,
    t2: &ReflectedTable,
    records: &mut [Record],
    values: &BTreeMap<String, Vec<Record>>,
) {
    let Some(pk) = t1.pk() else {
        return;
    };
    for record in records.iter_mut() {
        let Some(key) = record.get(&pk.name).and_then(key_of) else {
            continue;
        };
        let children = values
            .get(&key)
            .map(|children| children.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default();
        record.insert(t2.name().to_string(), Value::Array(children));
    }
}

fn set_habtm_values(
    t1: &ReflectedTable,
    t2: &ReflectedTable,
    records: &mut [Record],
    values: &HabtmValues,
) {
    let Some(pk) = t1.pk() else {
        return;
    };
    for record in records.iter_mut() {
        let Some(key) = record.get(&pk.name).and_then(key_of) else {
            continue;
        };
        let related: Vec<Value> = values
            .pk_values
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|far| values.fk_values.get(far).cloned().flatten())
            .map(Value::Object)
            .collect();
        record.insert(t2.name().to_string(), Value::Array(related));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Arguments, Dialect, PoolExecutor, PoolSettings, SqlExecutor};
    use crate::policy::{Operation, Policies};
    use crate::reflection::ReflectionService;
    use serde_json::json;

    struct Fixture {
        reflection: ReflectionService,
        db: GenericDb,
        policies: Policies,
    }

    impl Fixture {
        fn view(&self) -> SchemaView<'_> {
            SchemaView::new(&self.reflection, &self.policies, Operation::List)
        }

        fn joiner(&self, max_records: usize) -> RelationJoiner<'_> {
            RelationJoiner::new(&self.db, self.view(), max_records)
        }

        async fn table(&self, name: &str) -> Arc<ReflectedTable> {
            self.reflection.get_table(name).await.unwrap().unwrap()
        }

        async fn rows(&self, name: &str) -> Vec<Record> {
            let table = self.table(name).await;
            let ordering = OrderingInfo.default_ordering(&table);
            self.db
                .select_all(&table, &table.column_names(), &Condition::None, &ordering, 0, None)
                .await
                .unwrap()
        }
    }

    async fn blog() -> Fixture {
        let executor: Arc<dyn SqlExecutor> = Arc::new(
            PoolExecutor::connect_url(Dialect::Sqlite, "sqlite::memory:", PoolSettings::default())
                .await
                .unwrap(),
        );
        let none = Arguments::new(Dialect::Sqlite);
        for sql in [
            "CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, category_id INTEGER NOT NULL REFERENCES categories (id), content TEXT NOT NULL)",
            "CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL REFERENCES posts (id), message TEXT NOT NULL)",
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE post_tags (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL REFERENCES posts (id), tag_id INTEGER NOT NULL REFERENCES tags (id))",
            "INSERT INTO categories (id, name) VALUES (1, 'announcement'), (2, 'article')",
            "INSERT INTO posts (id, category_id, content) VALUES (1, 1, 'blog started'), (2, 2, 'second post'), (3, 2, 'no tags')",
            "INSERT INTO comments (id, post_id, message) VALUES (1, 1, 'great'), (2, 1, 'fantastic'), (3, 2, 'thank you')",
            "INSERT INTO tags (id, name) VALUES (1, 'funny'), (2, 'important')",
            "INSERT INTO post_tags (id, post_id, tag_id) VALUES (1, 1, 1), (2, 1, 2), (3, 2, 1)",
        ] {
            executor.execute(sql, &none).await.unwrap();
        }
        Fixture {
            reflection: ReflectionService::uncached(executor.clone()),
            db: GenericDb::new(executor, ""),
            policies: Policies::default(),
        }
    }

    fn params(query: &str) -> QueryParams {
        QueryParams::parse(query)
    }

    #[test]
    fn test_join_paths() {
        let joins = JoinPaths::from_params(&params("join=comments,users&join=tags&join=comments"));
        assert_eq!(
            joins.paths(),
            vec![
                vec!["comments".to_string(), "users".to_string()],
                vec!["tags".to_string()],
            ]
        );
        assert!(JoinPaths::from_params(&params("")).is_empty());
        assert!(JoinPaths::from_params(&params("")).paths().is_empty());
    }

    #[tokio::test]
    async fn test_belongs_to_replaces_key() {
        let fixture = blog().await;
        let posts = fixture.table("posts").await;
        let mut records = fixture.rows("posts").await;
        fixture
            .joiner(0)
            .add_joins(&posts, &mut records, &params("join=categories"))
            .await
            .unwrap();
        assert_eq!(records[0]["category_id"], json!({"id": 1, "name": "announcement"}));
        assert_eq!(records[2]["category_id"]["name"], "article");
    }

    #[tokio::test]
    async fn test_has_many_attaches_lists() {
        let fixture = blog().await;
        let posts = fixture.table("posts").await;
        let mut records = fixture.rows("posts").await;
        fixture
            .joiner(0)
            .add_joins(&posts, &mut records, &params("join=comments"))
            .await
            .unwrap();
        assert_eq!(records[0]["comments"].as_array().unwrap().len(), 2);
        assert_eq!(records[1]["comments"][0]["message"], "thank you");
        assert_eq!(records[2]["comments"], json!([]));
    }

    #[tokio::test]
    async fn test_belongs_to_is_has_many_reversed() {
        let fixture = blog().await;
        let categories = fixture.table("categories").await;
        let mut records = fixture.rows("categories").await;
        fixture
            .joiner(0)
            .add_joins(&categories, &mut records, &params("join=posts"))
            .await
            .unwrap();
        let ids: Vec<&Value> = records[1]["posts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|post| &post["id"])
            .collect();
        assert_eq!(ids, vec![&json!(2), &json!(3)]);
    }

    #[tokio::test]
    async fn test_many_to_many_through_junction() {
        let fixture = blog().await;
        let posts = fixture.table("posts").await;
        let mut records = fixture.rows("posts").await;
        fixture
            .joiner(0)
            .add_joins(&posts, &mut records, &params("join=tags"))
            .await
            .unwrap();
        let names = |record: &Record| -> Vec<String> {
            record["tags"]
                .as_array()
                .unwrap()
                .iter()
                .map(|tag| tag["name"].as_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(names(&records[0]), vec!["funny", "important"]);
        assert_eq!(names(&records[1]), vec!["funny"]);
        assert_eq!(records[2]["tags"], json!([]));
    }

    #[tokio::test]
    async fn test_nested_join_resolves_before_fold_back() {
        let fixture = blog().await;
        let comments = fixture.table("comments").await;
        let mut records = fixture.rows("comments").await;
        fixture
            .joiner(0)
            .add_joins(&comments, &mut records, &params("join=posts,categories"))
            .await
            .unwrap();
        assert_eq!(records[2]["post_id"]["id"], 2);
        assert_eq!(records[2]["post_id"]["category_id"]["name"], "article");
    }

    #[tokio::test]
    async fn test_record_cap_limits_to_many_fetch() {
        let fixture = blog().await;
        let posts = fixture.table("posts").await;
        let mut records = fixture.rows("posts").await;
        fixture
            .joiner(1)
            .add_joins(&posts, &mut records, &params("join=comments"))
            .await
            .unwrap();
        let total: usize = records
            .iter()
            .map(|record| record["comments"].as_array().unwrap().len())
            .sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_mandatory_columns() {
        let fixture = blog().await;
        let posts = fixture.table("posts").await;
        let mut query = params("join=categories&join=tags&include=content");
        fixture
            .joiner(0)
            .add_mandatory_columns(&posts, &mut query)
            .await
            .unwrap();
        assert_eq!(
            query.get("mandatory"),
            &["categories.id", "posts.category_id", "posts.id", "tags.id"]
        );

        let names = ColumnIncluder.names(&posts, true, &query);
        assert_eq!(names, vec!["id", "category_id", "content"]);
    }

    #[tokio::test]
    async fn test_unknown_join_table_is_skipped() {
        let fixture = blog().await;
        let posts = fixture.table("posts").await;
        let mut records = fixture.rows("posts").await;
        let before = records.clone();
        fixture
            .joiner(0)
            .add_joins(&posts, &mut records, &params("join=ghosts"))
            .await
            .unwrap();
        assert_eq!(records, before);
    }
}
