// SPDX-License-Identifier: GPL-3.0-only

//! MongoDB-backed document store client (sync API)

use super::{CameraDoc, CameraStatusDoc, DetectionRecord, ServiceDoc, ZoneDoc};
use crate::errors::StoreError;
use crate::health::HealthSink;
use crate::store::DetectionWriter;
use crate::zones::Zone;
use bson::doc;
use bson::oid::ObjectId;
use chrono::Utc;
use mongodb::sync::{Client, Database};
use tracing::{debug, error, info};

const DEFAULT_DATABASE: &str = "vigil";

/// Thin synchronous client over the deployment's document store
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    /// Connect using a MongoDB connection string. The database name is
    /// taken from the URI path, falling back to `vigil`.
    pub fn connect(uri: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).map_err(|e| StoreError::Connect(e.to_string()))?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        info!(database = %db.name(), "Connected to document store");
        Ok(Self { db })
    }

    /// Look up the camera record by id (or device name as a fallback)
    pub fn camera(&self, camera_id: &str) -> Result<CameraDoc, StoreError> {
        let filter = match ObjectId::parse_str(camera_id) {
            Ok(oid) => doc! { "_id": oid },
            Err(_) => doc! { "device_name": camera_id },
        };
        self.db
            .collection::<CameraDoc>("cameras")
            .find_one(filter)
            .run()
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or_else(|| StoreError::Missing(format!("camera {}", camera_id)))
    }

    /// Look up the service record by id (or service name as a fallback)
    pub fn service(&self, service_id: &str) -> Result<ServiceDoc, StoreError> {
        let filter = match ObjectId::parse_str(service_id) {
            Ok(oid) => doc! { "_id": oid },
            Err(_) => doc! { "service_name": service_id },
        };
        self.db
            .collection::<ServiceDoc>("services")
            .find_one(filter)
            .run()
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or_else(|| StoreError::Missing(format!("service {}", service_id)))
    }

    /// Resolve the zone documents referenced by a camera record
    pub fn zones(&self, refs: &[ObjectId]) -> Result<Vec<Zone>, StoreError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .db
            .collection::<ZoneDoc>("zones")
            .find(doc! { "_id": { "$in": refs } })
            .run()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut zones = Vec::new();
        for item in cursor {
            let zone_doc = item.map_err(|e| StoreError::Query(e.to_string()))?;
            zones.push(Zone::from(zone_doc));
        }
        debug!(count = zones.len(), "Resolved camera zones");
        Ok(zones)
    }
}

impl DetectionWriter for DocumentStore {
    fn insert_batch(&self, records: &[DetectionRecord]) -> Result<(), StoreError> {
        self.db
            .collection::<DetectionRecord>("metadata")
            .insert_many(records)
            .run()
            .map_err(|e| StoreError::Insert(e.to_string()))?;
        Ok(())
    }
}

impl HealthSink for DocumentStore {
    fn push_status(&self, device_name: &str, connected: bool, corrupted: bool) {
        let status = CameraStatusDoc {
            device_name: device_name.to_string(),
            timestamp: Utc::now(),
            connection: connected,
            frame_corruption: corrupted,
        };
        if let Err(e) = self
            .db
            .collection::<CameraStatusDoc>("camera_status")
            .insert_one(status)
            .run()
        {
            error!(device = device_name, error = %e, "Failed to push camera status");
        }
    }
}
