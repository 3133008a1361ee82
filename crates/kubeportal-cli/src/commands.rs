// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{instrument, warn};

use kubeportal_client::probe::AvailabilityProber;
use kubeportal_client::{Credentials, ResourceKind, SessionManager, SessionStatus, Synchronizer};

pub struct Output {
	pub json: bool,
}

impl Output {
	fn emit<T: Serialize>(&self, value: &T, plain: impl FnOnce()) -> Result<()> {
		if self.json {
			println!("{}", serde_json::to_string_pretty(value)?);
		} else {
			plain();
		}
		Ok(())
	}
}

#[instrument(skip_all)]
pub async fn login(
	manager: &SessionManager,
	username: Option<String>,
	password: Option<String>,
	google_token: Option<String>,
	out: &Output,
) -> Result<()> {
	let credentials = match (google_token, username, password) {
		(Some(token), _, _) => Credentials::oauth(token),
		(None, Some(username), Some(password)) => Credentials::password(username, password),
		(None, Some(_), None) => bail!("a password is required (--password or KUBEPORTAL_PASSWORD)"),
		(None, None, _) => bail!("either --username or --google-token is required"),
	};

	manager
		.bootstrap()
		.await
		.context("failed to reach the portal")?;
	let status = manager.login(credentials).await.context("login failed")?;

	let user = manager.current_user().await;
	out.emit(&status, || match status {
		SessionStatus::AccessPending => println!(
			"Signed in as {}. Access has not been approved yet.",
			user.as_ref().map(|u| u.display_name()).unwrap_or_default()
		),
		_ => println!(
			"Signed in as {}.",
			user.as_ref().map(|u| u.display_name()).unwrap_or_default()
		),
	})
}

pub async fn logout(manager: &SessionManager) -> Result<()> {
	let pending = manager.logout().await.context("logout failed")?;
	if let Some(handle) = pending {
		if let Err(e) = handle.await {
			warn!(error = %e, "logout request did not complete");
		}
	}
	println!("Signed out.");
	Ok(())
}

pub async fn whoami(manager: &SessionManager, out: &Output) -> Result<()> {
	require_session(manager).await?;
	let user = manager
		.request_current_user()
		.await
		.context("failed to fetch user")?;
	let status = manager.status().await;
	manager.persist().await.context("failed to save session")?;

	out.emit(&user, || {
		println!("{} ({})", user.display_name(), status.as_str());
		if let Some(email) = &user.primary_email {
			println!("email: {email}");
		}
	})
}

pub async fn pods(manager: &SessionManager, out: &Output) -> Result<()> {
	let records = collect(manager, &manager.resources().pods).await?;
	out.emit(&records, || {
		for pod in &records {
			println!(
				"{}\t{}\t{}\t{}",
				pod.name,
				pod.phase.as_deref().unwrap_or("-"),
				pod.images.join(","),
				pod.created.display()
			);
		}
	})
}

pub async fn deployments(manager: &SessionManager, out: &Output) -> Result<()> {
	let records = collect(manager, &manager.resources().deployments).await?;
	out.emit(&records, || {
		for d in &records {
			println!("{}\t{}\t{}", d.name, d.replicas, d.created.display());
		}
	})
}

pub async fn services(manager: &SessionManager, out: &Output) -> Result<()> {
	let records = collect(manager, &manager.resources().services).await?;
	out.emit(&records, || {
		for s in &records {
			println!(
				"{}\t{}\t{}\t{}",
				s.name,
				s.service_type.as_deref().unwrap_or("-"),
				s.ports.join(","),
				s.selector.as_deref().unwrap_or("-")
			);
		}
	})
}

pub async fn ingresses(
	manager: &SessionManager,
	probe: bool,
	timeout: Duration,
	out: &Output,
) -> Result<()> {
	let sync = &manager.resources().ingresses;
	collect(manager, sync).await?;
	if probe {
		let prober = AvailabilityProber::new(timeout).context("failed to build prober")?;
		sync.check_availability(&prober).await;
		manager.persist().await.context("failed to save session")?;
	}
	let records = sync.records().await;

	out.emit(&records, || {
		for i in &records {
			let availability = if probe {
				format!(
					"\t{} ({})",
					i.availability.status,
					i.availability.elapsed_display()
				)
			} else {
				String::new()
			};
			println!("{}\t{}{availability}", i.name, i.hosts.join(","));
		}
	})
}

pub async fn pvcs(manager: &SessionManager, out: &Output) -> Result<()> {
	let records = collect(manager, &manager.resources().pvcs).await?;
	out.emit(&records, || {
		for p in &records {
			println!(
				"{}\t{}\t{}\t{}",
				p.name,
				p.size.as_deref().unwrap_or("-"),
				p.storage_class.as_deref().unwrap_or("-"),
				p.phase.as_deref().unwrap_or("-")
			);
		}
	})
}

pub async fn storageclasses(manager: &SessionManager, out: &Output) -> Result<()> {
	require_session(manager).await?;
	let classes = manager
		.request_storageclasses()
		.await
		.context("failed to fetch storage classes")?;
	out.emit(&classes, || {
		for class in &classes {
			println!("{class}");
		}
	})
}

pub async fn news(manager: &SessionManager, out: &Output) -> Result<()> {
	require_session(manager).await?;
	let news = manager
		.request_news()
		.await
		.context("failed to fetch news")?;
	out.emit(&news, || {
		for item in &news {
			println!(
				"{} ({}, {})",
				item.title.as_deref().unwrap_or("(untitled)"),
				item.author.as_deref().unwrap_or("unknown"),
				item.created.display()
			);
		}
	})
}

pub async fn info(manager: &SessionManager, out: &Output) -> Result<()> {
	let records = collect(manager, &manager.resources().cluster_info).await?;
	out.emit(&records, || {
		for record in &records {
			println!("{}\t{}", record.slug, record.value);
		}
	})
}

pub async fn logs(manager: &SessionManager, pod: &str, page: Option<u32>, out: &Output) -> Result<()> {
	let pods = &manager.resources().pods;
	let found = match pods.find(pod).await {
		Some(found) => found,
		None => {
			collect(manager, pods).await?;
			pods
				.find(pod)
				.await
				.with_context(|| format!("no pod named {pod}"))?
		}
	};
	let Some(logs_url) = found.logs_url else {
		bail!("pod {pod} has no logs link");
	};

	let page = match page {
		Some(page) => page,
		None => pods.page_number(pod).await,
	};
	let logs = pods
		.request_logs(&logs_url, page)
		.await
		.context("failed to fetch logs")?;
	pods.set_page_number(pod, page).await;

	out.emit(&logs, || {
		for entry in &logs.entries {
			println!(
				"{}\t{}",
				entry.timestamp_display.as_deref().unwrap_or("-"),
				entry.log
			);
		}
		println!("page {} ({} lines total)", logs.page, logs.total);
	})
}

async fn require_session(manager: &SessionManager) -> Result<()> {
	match manager.status().await {
		SessionStatus::Anonymous | SessionStatus::Authenticating => {
			bail!("not signed in, run `kubeportal login` first")
		}
		_ => Ok(()),
	}
}

/// Repopulates one collection and returns the records.
async fn collect<K: ResourceKind>(
	manager: &SessionManager,
	sync: &Synchronizer<K>,
) -> Result<Vec<K::Record>> {
	require_session(manager).await?;
	if manager.status().await == SessionStatus::AccessPending {
		bail!("access to the portal has not been approved yet");
	}

	let report = manager
		.populate(sync)
		.await
		.with_context(|| format!("failed to list {}s", K::NAME))?;
	if report.skipped > 0 {
		warn!(kind = K::NAME, skipped = report.skipped, "some items could not be loaded");
	}

	Ok(sync.records().await)
}
