//! LanceDB-backed chunk table.
//!
//! One row per chunk: id, text, `source` and `chunk_type` columns for filter
//! pushdown, the full metadata as JSON and the embedding. Vector search uses
//! cosine distance; filters on other metadata keys are applied after the scan.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, DistanceType, Table};
use tracing::{debug, info};

use ragindex_core::traits::{Embedder, VectorStore};
use ragindex_core::types::{Chunk, Meta, MetaFilter, VectorHit, META_CHUNK_TYPE, META_SOURCE};
use ragindex_embed::EmbeddingCache;

use crate::schema::*;
use crate::EmbedVia;

/// Over-fetch factor when part of a filter can only be checked after the search.
const POST_FILTER_FANOUT: usize = 4;

pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    embed: EmbedVia,
}

impl LanceVectorStore {
    pub async fn open(db_path: &Path, table_name: &str, embedder: Arc<dyn Embedder>, cache: Option<Arc<EmbeddingCache>>) -> Result<Self> {
        let db = connect(db_path.to_string_lossy().as_ref()).execute().await?;
        let this = Self { db, table_name: table_name.to_string(), embed: EmbedVia::new(embedder, cache) };
        this.ensure_table().await?;
        Ok(this)
    }

    pub fn table_name(&self) -> &str { &self.table_name }

    async fn ensure_table(&self) -> Result<()> {
        if self.db.table_names().execute().await?.contains(&self.table_name) { return Ok(()); }
        let schema = self.schema()?;
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
        self.db.create_table(&self.table_name, Box::new(iter)).execute().await?;
        info!(table = %self.table_name, dim = self.embed.dim(), "created lance table");
        Ok(())
    }

    fn schema(&self) -> Result<Arc<arrow_schema::Schema>> {
        let dim = i32::try_from(self.embed.dim()).context("embedding dimension too large")?;
        Ok(build_chunk_schema(dim))
    }

    async fn table(&self) -> Result<Table> { Ok(self.db.open_table(&self.table_name).execute().await?) }

    pub async fn count(&self) -> Result<usize> { Ok(self.table().await?.count_rows(None).await?) }

    async fn to_record_batch(&self, chunks: &[Chunk]) -> Result<RecordBatch> {
        let dim = i32::try_from(self.embed.dim()).context("embedding dimension too large")?;
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let v = self.embed.embed(&chunk.text).await?;
            anyhow::ensure!(v.len() == self.embed.dim(), "embedder returned {} dims, expected {}", v.len(), self.embed.dim());
            vectors.push(Some(v.into_iter().map(Some).collect()));
        }
        let meta = |key: &str| -> Vec<String> { chunks.iter().map(|c| c.metadata.get(key).cloned().unwrap_or_default()).collect() };
        let metadata = chunks.iter().map(|c| serde_json::to_string(&c.metadata)).collect::<Result<Vec<_>, _>>()?;
        Ok(RecordBatch::try_new(self.schema()?, vec![
            Arc::new(StringArray::from(chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(meta(META_SOURCE))),
            Arc::new(StringArray::from(meta(META_CHUNK_TYPE))),
            Arc::new(StringArray::from(metadata)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
        ])?)
    }

    /// Rows matching `filter`, as chunks.
    async fn scan(&self, filter: Option<&MetaFilter>) -> Result<Vec<Chunk>> {
        let table = self.table().await?;
        let mut query = table.query().select(Select::columns(&[COL_ID, COL_TEXT, COL_METADATA]));
        let (pushed, rest) = split_filter(filter);
        if let Some(sql) = pushed { query = query.only_if(sql); }
        let mut stream = query.execute().await?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            for row in read_rows(&batch)? {
                if rest.as_ref().map_or(true, |f| row.chunk.matches(f)) { out.push(row.chunk); }
            }
        }
        Ok(out)
    }
}

struct Row {
    chunk: Chunk,
    distance: Option<f32>,
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{}' missing or mistyped", name))
}

fn read_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let ids = column::<StringArray>(batch, COL_ID)?;
    let texts = column::<StringArray>(batch, COL_TEXT)?;
    let metas = column::<StringArray>(batch, COL_METADATA)?;
    let distances = column::<Float32Array>(batch, COL_DISTANCE).ok();
    (0..batch.num_rows())
        .map(|i| -> Result<Row> {
            let metadata: Meta = serde_json::from_str(metas.value(i))?;
            let distance = distances.filter(|d| d.is_valid(i)).map(|d| d.value(i));
            Ok(Row { chunk: Chunk { id: ids.value(i).to_string(), text: texts.value(i).to_string(), metadata }, distance })
        })
        .collect()
}

fn quote(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

/// SQL for the keys that have their own column, plus whatever must be checked per row.
fn split_filter(filter: Option<&MetaFilter>) -> (Option<String>, Option<MetaFilter>) {
    let Some(filter) = filter else { return (None, None) };
    let mut clauses = Vec::new();
    let mut rest = MetaFilter::new();
    for (key, value) in filter {
        if PUSHDOWN_KEYS.contains(&key.as_str()) { clauses.push(format!("{} = {}", key, quote(value))); } else { rest.insert(key.clone(), value.clone()); }
    }
    clauses.sort();
    let sql = (!clauses.is_empty()).then(|| clauses.join(" AND "));
    (sql, (!rest.is_empty()).then_some(rest))
}

fn id_list(ids: &[String]) -> String { ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", ") }

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn query(&self, query_text: &str, n_results: usize, filter: Option<&MetaFilter>) -> Result<Vec<VectorHit>> {
        if n_results == 0 { return Ok(Vec::new()); }
        let q = self.embed.embed(query_text).await?;
        let table = self.table().await?;
        let (pushed, rest) = split_filter(filter);
        let limit = if rest.is_some() { n_results * POST_FILTER_FANOUT } else { n_results };
        let mut search = table.vector_search(q)?.distance_type(DistanceType::Cosine).limit(limit);
        if let Some(sql) = pushed { search = search.only_if(sql); }
        let mut stream = search.execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            for row in read_rows(&batch)? {
                if !rest.as_ref().map_or(true, |f| row.chunk.matches(f)) { continue; }
                let Chunk { id, text, metadata } = row.chunk;
                hits.push(VectorHit { id, text, metadata, distance: row.distance.unwrap_or(f32::MAX) });
            }
        }
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        debug!(hits = hits.len(), "lance vector query");
        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        if ids.is_empty() { return Ok(Vec::new()); }
        let table = self.table().await?;
        let mut stream = table
            .query()
            .select(Select::columns(&[COL_ID, COL_TEXT, COL_METADATA]))
            .only_if(format!("{} IN ({})", COL_ID, id_list(ids)))
            .execute()
            .await?;
        let mut by_id: HashMap<String, Chunk> = HashMap::new();
        while let Some(batch) = stream.try_next().await? {
            for row in read_rows(&batch)? { by_id.insert(row.chunk.id.clone(), row.chunk); }
        }
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() { return Ok(()); }
        let batch = self.to_record_batch(chunks).await?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.table().await?;
        let mut mi = table.merge_insert(&[COL_ID]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await?;
        info!(chunks = chunks.len(), table = %self.table_name, "upserted chunks");
        Ok(())
    }

    async fn delete(&self, filter: &MetaFilter) -> Result<usize> {
        let ids: Vec<String> = self.scan(Some(filter)).await?.into_iter().map(|c| c.id).collect();
        if ids.is_empty() { return Ok(0); }
        self.table().await?.delete(&format!("{} IN ({})", COL_ID, id_list(&ids))).await?;
        info!(deleted = ids.len(), table = %self.table_name, "deleted chunks");
        Ok(ids.len())
    }

    async fn distinct_values(&self, key: &str) -> Result<Vec<String>> {
        let values: BTreeSet<String> = self.scan(None).await?.into_iter().filter_map(|c| c.metadata.get(key).cloned()).collect();
        Ok(values.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_splits_into_sql_and_residual() {
        let mut filter = MetaFilter::new();
        filter.insert("source".into(), "o'brien.txt".into());
        filter.insert("category".into(), "notes".into());
        let (sql, rest) = split_filter(Some(&filter));
        assert_eq!(sql.as_deref(), Some("source = 'o''brien.txt'"));
        assert_eq!(rest.and_then(|r| r.get("category").cloned()).as_deref(), Some("notes"));
        assert_eq!(split_filter(None), (None, None));
    }
}
