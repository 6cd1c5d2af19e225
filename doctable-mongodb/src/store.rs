use async_trait::async_trait;
use futures::StreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions as MongoFindOptions},
};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use doctable_core::{
    backend::{FindOptions, Namespace, StoreBackend, StoreBackendBuilder, UpdateOutcome, WireStream},
    error::{DocumentStoreError, DocumentStoreResult},
    query::SortSpec,
    value::Document,
};

use crate::{
    config::MongoDbConfig,
    convert::{to_bson_document, to_wire, to_wire_document},
};

fn backend_error(error: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

fn sort_document(sort: &SortSpec) -> bson::Document {
    sort.iter()
        .map(|(field, direction)| (field.clone(), bson::Bson::Int32(direction.as_i32())))
        .collect()
}

/// MongoDB implementation of [`StoreBackend`].
///
/// Each namespace maps to `database.collection` on the server, so one store serves every
/// schema a connection resolves to.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(config: MongoDbConfig, fallback: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(config, fallback)
    }

    /// The database resolved from the configuration, used as the connection's schema.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<bson::Document> {
        self.client
            .database(&namespace.schema)
            .collection(&namespace.collection)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<WireStream> {
        let mut find_options = MongoFindOptions::default();

        if !options.sort.is_empty() {
            find_options.sort = Some(sort_document(&options.sort));
        }
        if let Some(skip) = options.skip {
            find_options.skip = Some(skip);
        }
        if let Some(limit) = options.limit {
            find_options.limit = Some(limit as i64);
        }

        let cursor = self
            .get_collection(namespace)
            .find(to_bson_document(filter))
            .with_options(find_options)
            .await
            .map_err(backend_error)?;

        Ok(cursor
            .map(|document| document.map(|d| to_wire_document(&d)).map_err(backend_error))
            .boxed())
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        sort: &SortSpec,
    ) -> DocumentStoreResult<Option<JsonValue>> {
        let collection = self.get_collection(namespace);
        let mut find_one = collection.find_one(to_bson_document(filter));
        if !sort.is_empty() {
            find_one = find_one.sort(sort_document(sort));
        }

        Ok(find_one
            .await
            .map_err(backend_error)?
            .map(|document| to_wire_document(&document)))
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
    ) -> DocumentStoreResult<JsonValue> {
        let result = self
            .get_collection(namespace)
            .insert_one(to_bson_document(&document))
            .await
            .map_err(backend_error)?;

        debug!(%namespace, "mongodb insert");
        Ok(to_wire(&result.inserted_id))
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let result = self
            .get_collection(namespace)
            .update_one(to_bson_document(filter), to_bson_document(update))
            .await
            .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let result = self
            .get_collection(namespace)
            .update_many(to_bson_document(filter), to_bson_document(update))
            .await
            .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(namespace)
            .delete_one(to_bson_document(filter))
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        Ok(self
            .get_collection(namespace)
            .delete_many(to_bson_document(filter))
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn count(&self, namespace: &Namespace, filter: &Document) -> DocumentStoreResult<u64> {
        self.get_collection(namespace)
            .count_documents(to_bson_document(filter))
            .await
            .map_err(backend_error)
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;
        info!(database = %self.database, "mongodb client shut down");

        Ok(())
    }
}

/// Builds a [`MongoDbStore`] from a [`MongoDbConfig`].
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    config: MongoDbConfig,
    fallback: String,
}

impl MongoDbStoreBuilder {
    /// `fallback` names the database when the configuration does not.
    pub fn new(config: MongoDbConfig, fallback: &str) -> Self {
        Self {
            config,
            fallback: fallback.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let url = self.config.connection_url();
        let database = self.config.database(&self.fallback);

        let client = Client::with_options(
            ClientOptions::parse(&url)
                .await
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        info!(%database, "mongodb client ready");
        Ok(MongoDbStore::new(client, database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use doctable_core::query::SortDirection;

    #[test]
    fn sort_specs_keep_field_order() {
        let sort = SortSpec::from([
            ("age".to_string(), SortDirection::Desc),
            ("name".to_string(), SortDirection::Asc),
        ]);

        let converted = sort_document(&sort);

        assert_eq!(converted, doc! { "age": -1, "name": 1 });
        assert_eq!(converted.keys().collect::<Vec<_>>(), ["age", "name"]);
    }

    #[tokio::test]
    async fn builder_resolves_the_database_without_connecting() {
        let store = MongoDbStore::builder(MongoDbConfig::new("mgdb://127.0.0.1:27017/shop"), "main")
            .build()
            .await
            .unwrap();

        assert_eq!(store.database(), "shop");
    }
}
