//! Composition root
//!
//! Builds one gateway per table (or none at all), binds the testimonial
//! mirror and owns the five stores for the lifetime of a session.

use crate::auth::{ADMIN_TABLE, AdminGate, AuthError, AuthResult, RestAuth};
use crate::config::SiteConfig;
use crate::core::{Result, SyncError};
use crate::domains::{
    CommissionStore, ContactStore, ProgramStore, RequirementStore, TESTIMONIAL_MIRROR_KEY,
    TestimonialStore, programs, testimonials,
};
use crate::gateway::{RestClient, TableGateway};
use crate::mirror::{FileMirror, MemoryMirror, MirrorCache};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Headline numbers of the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_programs: usize,
    pub active_programs: usize,
    pub total_testimonials: usize,
    pub published_testimonials: usize,
    /// Mean rating of published testimonials; `None` when there are none.
    pub average_rating: Option<f64>,
    pub requirements: usize,
}

/// All stores of the landing page.
pub struct Site {
    pub programs: ProgramStore,
    pub testimonials: TestimonialStore,
    pub requirements: RequirementStore,
    pub commission: CommissionStore,
    pub contact: ContactStore,
    client: Option<RestClient>,
}

impl Site {
    /// Wires the stores from configuration. Without a remote store every
    /// store serves its defaults and accepts local writes.
    pub fn from_config(config: &SiteConfig) -> Result<Self> {
        let mirror: Arc<dyn MirrorCache> = match &config.mirror_dir {
            Some(dir) => Arc::new(FileMirror::new(dir.clone())),
            None => Arc::new(MemoryMirror::new()),
        };

        let client = match RestClient::connect(config.remote.as_ref()) {
            Ok(client) => Some(client),
            Err(SyncError::RemoteUnavailable) => {
                info!("remote store not configured, serving defaults");
                None
            }
            Err(err) => return Err(err),
        };

        let tables = client.clone();
        let mut site = Self::assemble(
            move |table| {
                tables
                    .as_ref()
                    .map(|client| Arc::new(client.table(table)) as Arc<dyn TableGateway>)
            },
            mirror,
        );
        site.client = client;
        Ok(site)
    }

    /// Wires the stores over caller supplied gateways; `tables` returns
    /// `None` for a table without remote store.
    pub fn assemble<F>(tables: F, mirror: Arc<dyn MirrorCache>) -> Self
    where
        F: Fn(&str) -> Option<Arc<dyn TableGateway>>,
    {
        Self {
            programs: ProgramStore::new(tables("programs")),
            testimonials: TestimonialStore::new(tables("testimoni"))
                .with_mirror(mirror, TESTIMONIAL_MIRROR_KEY),
            requirements: RequirementStore::new(tables("requirements")),
            commission: CommissionStore::new(tables("komisi_magang")),
            contact: ContactStore::new(tables("contact_info")),
            client: None,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.client.is_some()
    }

    /// Loads every store concurrently.
    pub async fn load_all(&self) {
        tokio::join!(
            self.programs.load(),
            self.testimonials.load(),
            self.requirements.load(),
            self.commission.load(),
            self.contact.load(),
        );
        info!("all stores loaded");
    }

    /// Stops every change feed.
    pub fn dispose(&self) {
        self.programs.dispose();
        self.testimonials.dispose();
        self.requirements.dispose();
        self.commission.dispose();
        self.contact.dispose();
    }

    pub fn summary(&self) -> DashboardSummary {
        let program_view = self.programs.snapshot();
        let testimonial_view = self.testimonials.snapshot();

        let published: Vec<i64> = testimonial_view
            .filtered(testimonials::published)
            .map(|t| t.rating)
            .collect();
        let average_rating = if published.is_empty() {
            None
        } else {
            Some(published.iter().sum::<i64>() as f64 / published.len() as f64)
        };

        DashboardSummary {
            total_programs: program_view.len(),
            active_programs: program_view.filtered(programs::active).count(),
            total_testimonials: testimonial_view.len(),
            published_testimonials: published.len(),
            average_rating,
            requirements: self.requirements.record().len(),
        }
    }

    /// Admin sign-in over the configured remote store.
    pub fn admin_gate(&self) -> AuthResult<AdminGate> {
        let Some(client) = &self.client else {
            return Err(AuthError::NotConfigured);
        };
        let auth = Arc::new(RestAuth::new(client.config())?);
        let client = client.clone();
        Ok(AdminGate::new(auth, move |session| {
            Arc::new(client.with_access_token(&session.access_token).table(ADMIN_TABLE))
                as Arc<dyn TableGateway>
        }))
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        self.dispose();
    }
}
