//! Scripted walkthrough against the loopback transport
//!
//! Opens two sessions, drives terminal I/O, resizes, browses and transfers files,
//! then closes everything and prints what the multiplexer observed.

use anyhow::{Result, anyhow};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::output::{SearchDirection, SearchOptions};
use crate::session::{SessionEvent, SessionId, SessionManager};
use crate::transfer::{TransferDirection, TransferState};
use crate::transport::{AuthMethod, HostParams};

/// How long to wait for backend events before giving up on a step
const SETTLE_TIMEOUT: Duration = Duration::from_millis(200);

/// Drives a [`SessionManager`] through a fixed script
pub struct DemoRunner {
    manager: SessionManager,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    ui_events: u64,
    start_time: Instant,
    checks_passed: u64,
    checks_failed: u64,
}

impl DemoRunner {
    pub fn new(config: Config) -> Self {
        let (mut manager, _transport) = SessionManager::with_loopback(config);
        let events = manager.take_event_receiver();
        Self {
            manager,
            events,
            ui_events: 0,
            start_time: Instant::now(),
            checks_passed: 0,
            checks_failed: 0,
        }
    }

    /// Process backend events until nothing arrives for a short while
    async fn settle(&mut self) {
        while let Ok(true) = tokio::time::timeout(SETTLE_TIMEOUT, self.manager.step()).await {}
        self.drain_events();
    }

    fn drain_events(&mut self) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        while let Ok(event) = events.try_recv() {
            self.ui_events += 1;
            if let SessionEvent::Error { message } = event {
                println!("   ⚠️  {}", message);
            }
        }
    }

    fn check(&mut self, label: &str, ok: bool) {
        if ok {
            self.checks_passed += 1;
            println!("   ✅ {}", label);
        } else {
            self.checks_failed += 1;
            println!("   ❌ {}", label);
        }
    }

    async fn open(&mut self, host: &str, name: &str) -> Result<SessionId> {
        let params = HostParams::new(host, "demo", AuthMethod::Agent).with_display_name(name);
        let id = self.manager.create(params).await?;
        println!("🔌 Opened {} as {}", name, id);
        Ok(id)
    }

    /// Run the whole script
    pub async fn run(&mut self) -> Result<()> {
        println!("🚀 Testing Terminoda session multiplexer (loopback transport)");

        let web = self.open("web-1.internal", "web").await?;
        let db = self.open("db-1.internal", "db").await?;
        self.settle().await;

        println!("\n⌨️  Terminal I/O");
        self.manager.write(&web, b"uptime\n").await?;
        self.manager.write(&db, b"select 1;\n").await?;
        self.settle().await;
        let web_text = self.manager.outputs().rendered_text(&web).unwrap_or_default();
        let db_text = self.manager.outputs().rendered_text(&db).unwrap_or_default();
        self.check(
            "output stays in its own session",
            web_text.contains("uptime") && !web_text.contains("select"),
        );
        self.check("second session received its echo", db_text.contains("select 1;"));

        let found = self
            .manager
            .search(&web, "uptime", SearchDirection::Next, SearchOptions::default())?;
        self.check("search finds echoed input", found.is_some());

        println!("\n📐 Geometry");
        self.manager.request_resize(&web, 100, 30).await?;
        self.manager.request_resize(&web, 120, 40).await?;
        self.settle().await;
        self.check(
            "latest resize wins",
            self.manager.resize_negotiator().geometry(&web) == Some((120, 40)),
        );

        println!("\n📂 Directory browsing");
        self.manager.navigate_to(&web, "/home/demo")?;
        self.settle().await;
        let listed = self
            .manager
            .navigator()
            .view(&web)
            .map(|v| v.entries.len())
            .unwrap_or_default();
        self.check("home directory listed", listed == 2);

        println!("\n⇅ Transfers");
        self.manager
            .start_transfer(&web, TransferDirection::Download, "report.pdf", "report.pdf", None)?;
        self.settle().await;
        let state = self.manager.transfers().current(&web).map(|op| op.state);
        self.check(
            "download completes",
            state == Some(TransferState::Completed),
        );

        let missing = self.manager.start_transfer(
            &db,
            TransferDirection::Download,
            "/nowhere/missing.bin",
            "missing.bin",
            None,
        )?;
        self.settle().await;
        let failed = self
            .manager
            .transfers()
            .current(&db)
            .filter(|op| op.id == missing)
            .map(|op| op.state == TransferState::Failed)
            .unwrap_or(false);
        self.check("missing remote file fails the transfer", failed);

        println!("\n🔒 Teardown");
        self.manager.close(&db).await;
        let rejected = self.manager.write(&db, b"late\n").await.is_err();
        self.check("closed session rejects input", rejected);

        self.manager.shutdown().await?;
        self.drain_events();
        self.check(
            "shutdown leaves no active sessions",
            self.manager.registry().active_count() == 0,
        );

        self.print_summary();
        if self.checks_failed > 0 {
            return Err(anyhow!("{} demo checks failed", self.checks_failed));
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        let stats = self.manager.stats();
        let elapsed = self.start_time.elapsed();

        println!("\n📊 Test Results Summary:");
        println!("   🔌 Sessions opened/closed: {}/{}", stats.sessions_opened, stats.sessions_closed);
        println!("   📬 Events delivered: {}", self.manager.event_bus().delivered());
        println!("   🔄 Events routed: {}", stats.events_routed);
        println!("   🖥️  UI events: {}", self.ui_events);
        println!("   🗑️  Events dropped: {}", stats.events_dropped);
        println!("   📝 Output bytes: {}", stats.output_bytes);
        println!(
            "   ⇅ Transfers completed/failed: {}/{}",
            stats.transfers_completed, stats.transfers_failed
        );
        println!("   ⏱️  Elapsed: {:.2}s", elapsed.as_secs_f64());

        if self.checks_failed == 0 {
            println!("✅ All {} checks passed!", self.checks_passed);
        } else {
            println!(
                "⚠️  {} of {} checks failed",
                self.checks_failed,
                self.checks_passed + self.checks_failed
            );
        }
    }
}

/// Run the scripted demo with the given configuration
pub async fn run_demo(config: Config) -> Result<()> {
    let mut runner = DemoRunner::new(config);
    runner.run().await
}
