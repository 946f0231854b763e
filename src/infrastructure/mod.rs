pub mod datastore;
pub mod model_store;
