//! Flash session orchestration
//!
//! One `run()` is one session: take the lock, gate on the printer being
//! idle, fetch the release tree, stop Klipper, then walk the cycle of
//! discovery, device selection, bootloader entry, artifact resolution,
//! confirmation and dispatch. The Klipper service is restarted no matter
//! how the cycle ends, and the dispatch latch guarantees at most one write
//! per session.

use std::path::{Path, PathBuf};

use crate::bootloader;
use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::error::{FlashError, Result};
use crate::flasher;
use crate::katapult;
use crate::klippy;
use crate::lock::SessionLock;
use crate::probe::{self, can, dfu, usb};
use crate::proc::CommandRunner;
use crate::prompt::Prompter;
use crate::release;
use crate::resolver::{
    self, FirmwareArtifact, TreeLayout, VariantFilter, Version, COMBINED_SUBDIR, DEPLOYER_SUBDIR,
    VERSIONED_SUBDIR,
};
use crate::service::PrintService;
use crate::session::{DeviceRecord, Outcome, SessionState, Transport, TransportKind};
use crate::ui;

/// Last release before the configuration format changed; flashing anything
/// newer needs config updates and recalibration afterwards, so it gets an
/// explicit acknowledgment.
pub const CONFIG_BREAK_VERSION: Version = Version::new(5, 0, 0);

const MANUAL_ENTRY: &str = "Enter the UUID manually";
const NONE_OF_THESE: &str = "None of these";

/// Session phase, for the diagnostic trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discovering,
    SelectingDevice,
    EnteringBootloader,
    ResolvingArtifact,
    Confirming,
    Flashing,
    CleaningUp,
}

/// Options carried from the command line into a session
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Force one transport instead of discovering
    pub transport: Option<Transport>,
    /// Release channel (git ref) to fetch firmware from
    pub channel: String,
    /// Flash the katapult deployer images instead of probe firmware
    pub flash_katapult: bool,
    /// Offer the high-temperature firmware builds
    pub high_temp: bool,
    /// Creality K-series printers use a dedicated serial image
    pub kseries: bool,
    /// Offer every version in the release tree, not just the newest
    pub all_versions: bool,
    /// Known device identifier (CAN UUID or serial path), skips lookup
    pub device: Option<String>,
    /// Take the first candidate everywhere a prompt would appear
    pub assume_yes: bool,
}

pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a Settings,
    prompter: &'a mut dyn Prompter,
    opts: RunOptions,
    state: SessionState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        settings: &'a Settings,
        prompter: &'a mut dyn Prompter,
        opts: RunOptions,
    ) -> Self {
        Self {
            runner,
            settings,
            prompter,
            opts,
            state: SessionState::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run one complete session
    pub fn run(&mut self) -> Result<Outcome> {
        let _lock = SessionLock::acquire(&self.settings.session_lock_path())?;

        let service = PrintService::new(self.runner, self.settings);
        service.assert_idle()?;
        self.state.precondition_passed = true;

        let spinner = ui::spinner("Fetching firmware release tree...");
        let release = release::fetch(self.runner, self.settings, &self.opts.channel);
        spinner.finish_and_clear();
        let release = release?;
        tracing::info!(channel = %release.channel, "release tree ready");

        // CAN and USB flashing go through the katapult scripts
        if self.opts.transport != Some(Transport::Dfu) {
            let repo = katapult::ensure_checkout(&self.settings.katapult_dir)?;
            katapult::refresh(&repo)?;
        }

        service.stop_klipper()?;
        let result = self.flash_cycle(release.root());
        self.enter_phase(Phase::CleaningUp);
        tracing::info!(flashed = self.state.has_flashed(), "restoring Klipper");
        service.restart_klipper()?;

        match result {
            Ok(()) => {
                self.state.outcome = Outcome::Success;
                ui::success("Firmware flashed");
                ui::heading(
                    "Check the canbus_uuid / serial entries in your printer config \
                     and recalibrate the probe before printing",
                );
                Ok(Outcome::Success)
            }
            Err(e) => {
                self.state.outcome = Outcome::Failed;
                Err(e)
            }
        }
    }

    /// Discovery through dispatch, against an already-unpacked release tree
    pub fn flash_cycle(&mut self, release_root: &Path) -> Result<()> {
        self.state.reset();

        self.enter_phase(Phase::Discovering);
        probe::discover(self.runner, self.settings, &mut self.state)?;

        self.enter_phase(Phase::SelectingDevice);
        let transport = self.select_transport()?;
        match transport {
            Transport::Can => self.ensure_can_bootloader()?,
            Transport::Usb => self.ensure_usb_bootloader()?,
            Transport::Dfu => self.ensure_dfu_device()?,
        }

        tracing::debug!(
            flashable = ?self.state.flashable_transports(),
            "candidates after device preparation"
        );
        if !self.state.set_active(transport) {
            return Err(FlashError::DiscoveryEmpty);
        }

        self.enter_phase(Phase::ResolvingArtifact);
        let (artifact, scan_root) = self.select_artifact(release_root, transport)?;

        self.enter_phase(Phase::Confirming);
        self.acknowledge_skew(&artifact)?;
        if !self.opts.assume_yes {
            let question = format!("Flash {} over {}?", artifact.file_name, transport);
            if !self.prompter.confirm(&question, true)? {
                return Err(FlashError::Aborted);
            }
        }

        self.enter_phase(Phase::Flashing);
        let firmware = scan_root.join(&artifact.relative_path);
        self.dispatch(transport, &firmware)
    }

    fn enter_phase(&self, phase: Phase) {
        tracing::info!(?phase, "session phase");
    }

    /// Pick the transport to flash over. A forced transport always wins;
    /// otherwise a single discovered device decides, and several discovered
    /// devices go to the operator.
    fn select_transport(&mut self) -> Result<Transport> {
        if let Some(forced) = self.opts.transport {
            return Ok(forced);
        }

        // CAN application-mode records are selectable here; bootloader entry
        // happens right after selection. Records iterate in transport order.
        let present: Vec<Transport> = self.state.devices().map(|d| d.kind.transport()).collect();

        match present.len() {
            0 => Err(FlashError::DiscoveryEmpty),
            1 => Ok(present[0]),
            _ => {
                let items: Vec<String> = present
                    .iter()
                    .map(|t| {
                        let id = self
                            .state
                            .device(*t)
                            .map(|d| d.identifier.clone())
                            .unwrap_or_default();
                        format!("{t} - {id}")
                    })
                    .collect();
                let picked = self
                    .prompter
                    .select("Several devices found; which one is the probe?", &items)?
                    .ok_or(FlashError::Aborted)?;
                Ok(present[picked])
            }
        }
    }

    /// Make sure the CAN candidate is in bootloader mode, resolving the UUID
    /// from the discovery record, the command line, the klippy log, or the
    /// operator, in that order. A device that fails bootloader entry is
    /// dropped so identification starts over next session.
    fn ensure_can_bootloader(&mut self) -> Result<()> {
        let known = self
            .state
            .device(Transport::Can)
            .map(|r| (r.kind, r.identifier.clone()));
        let uuid = match known {
            Some((TransportKind::CanBootloader, id)) => {
                self.state.resolved_uuid = Some(id);
                return Ok(());
            }
            Some((_, id)) => id,
            None => self.identify_can_uuid()?,
        };

        self.enter_phase(Phase::EnteringBootloader);
        bootloader::enter(self.runner, self.settings, &uuid)?;
        self.state
            .record_device(DeviceRecord::new(TransportKind::CanBootloader, uuid.clone()));
        self.state.resolved_uuid = Some(uuid);
        Ok(())
    }

    /// Find the probe's bus UUID when the live query saw nothing
    fn identify_can_uuid(&mut self) -> Result<String> {
        if let Some(known) = &self.opts.device {
            return Ok(known.clone());
        }

        let candidates = match klippy::find_bus_uuids(&self.settings.klippy_log) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "klippy log unavailable");
                Vec::new()
            }
        };

        if candidates.is_empty() {
            return self
                .prompter
                .input("Enter the probe's CAN UUID")?
                .ok_or(FlashError::Aborted);
        }

        let mut items: Vec<String> = candidates
            .iter()
            .map(|c| match c.section {
                Some(section) => format!("{} (from {section})", c.uuid),
                None => c.uuid.clone(),
            })
            .collect();
        items.push(MANUAL_ENTRY.to_string());

        let picked = self
            .prompter
            .select("Which UUID belongs to the probe?", &items)?
            .ok_or(FlashError::Aborted)?;

        if picked == candidates.len() {
            self.prompter
                .input("Enter the probe's CAN UUID")?
                .ok_or(FlashError::Aborted)
        } else {
            Ok(candidates[picked].uuid.clone())
        }
    }

    /// Make sure a USB candidate in bootloader mode exists. An explicitly
    /// named serial path stands in for discovery, but an application-named
    /// path still has to reboot into its bootloader first.
    fn ensure_usb_bootloader(&mut self) -> Result<()> {
        if self.state.device(Transport::Usb).is_some() {
            return Ok(());
        }
        let Some(raw) = self.opts.device.clone() else {
            return Err(FlashError::DiscoveryEmpty);
        };

        let given = PathBuf::from(&raw);
        let path = match usb::classify(&given) {
            usb::UsbMode::Bootloader => given,
            usb::UsbMode::Application => {
                self.enter_phase(Phase::EnteringBootloader);
                usb::enter_bootloader(self.runner, self.settings, &given)?
            }
        };
        self.state.record_device(DeviceRecord::new(
            TransportKind::UsbBootloader,
            path.display().to_string(),
        ));
        Ok(())
    }

    /// Wait for a DFU device when one was explicitly requested but is not
    /// plugged in yet. The operator cancels by pressing Enter; the keypress
    /// is polled between probes, leaving stdin untouched for later prompts.
    fn ensure_dfu_device(&mut self) -> Result<()> {
        if self.state.device(Transport::Dfu).is_some() {
            return Ok(());
        }
        if self.opts.transport != Some(Transport::Dfu) {
            return Err(FlashError::DiscoveryEmpty);
        }

        ui::heading("Hold BOOT while plugging the probe in to enter DFU mode");
        println!("Press Enter to cancel the wait.");

        let cancel = CancelToken::new();
        let keypress_cancel = cancel.clone();
        let spinner = ui::spinner("Waiting for a DFU device...");
        let found = dfu::wait_for_device(
            self.runner,
            self.settings.dfu_poll_interval(),
            &cancel,
            |pause| {
                if ui::key_pressed(pause) {
                    keypress_cancel.cancel();
                }
            },
        );
        spinner.finish_and_clear();

        match found? {
            Some(id) => {
                self.state
                    .record_device(DeviceRecord::new(TransportKind::UsbDfu, id));
                Ok(())
            }
            None => Err(FlashError::Aborted),
        }
    }

    /// Resolve the candidate list for the transport and pick one file. The
    /// default menu shows only the newest version; `--all` widens it.
    fn select_artifact(
        &mut self,
        release_root: &Path,
        transport: Transport,
    ) -> Result<(FirmwareArtifact, PathBuf)> {
        let (layout, subdir) = if transport == Transport::Dfu {
            (TreeLayout::Deployer, COMBINED_SUBDIR)
        } else if self.opts.flash_katapult {
            (TreeLayout::Deployer, DEPLOYER_SUBDIR)
        } else {
            (TreeLayout::Versioned, VERSIONED_SUBDIR)
        };

        let bitrate_tag = if transport == Transport::Can {
            can::link_info(self.runner, self.settings)?.flatten()
        } else {
            None
        };

        let filter = VariantFilter::for_transport(
            transport,
            bitrate_tag,
            self.opts.kseries,
            self.opts.high_temp,
        );
        let scan_root = release_root.join(subdir);
        let mut candidates = resolver::resolve(&scan_root, layout, &filter)?;

        if candidates.is_empty() {
            return Err(FlashError::ArtifactNotFound {
                pattern: format!("{transport} firmware under {subdir}"),
            });
        }

        // Newest-first ordering makes "latest only" a prefix of the list
        if !self.opts.all_versions && layout == TreeLayout::Versioned {
            let newest = candidates[0].version;
            candidates.retain(|a| a.version == newest);
        }

        let picked = if self.opts.assume_yes {
            candidates[0].clone()
        } else {
            let mut items: Vec<String> = candidates.iter().map(ToString::to_string).collect();
            items.push(NONE_OF_THESE.to_string());
            let index = self
                .prompter
                .select("Select the firmware to flash", &items)?
                .ok_or(FlashError::Aborted)?;
            if index == candidates.len() {
                return Err(FlashError::Aborted);
            }
            candidates[index].clone()
        };

        self.state.selected_artifact = Some(picked.clone());
        Ok((picked, scan_root))
    }

    /// Firmware newer than the reference release needs an explicit
    /// acknowledgment, even in `--yes` mode: the configuration format
    /// changed after that release, so the printer config must be updated
    /// and the probe recalibrated once the flash completes.
    fn acknowledge_skew(&mut self, artifact: &FirmwareArtifact) -> Result<()> {
        let Some(version) = artifact.version else {
            return Ok(());
        };
        if version <= CONFIG_BREAK_VERSION {
            return Ok(());
        }

        ui::warn(&format!(
            "{} is newer than {CONFIG_BREAK_VERSION}: your printer config needs \
             updating and the probe must be recalibrated after flashing",
            artifact.file_name
        ));
        if !self
            .prompter
            .confirm("Continue with this firmware?", false)?
        {
            return Err(FlashError::Aborted);
        }
        self.state.skew_acknowledged = true;
        Ok(())
    }

    /// Hand the firmware to the transport tool, guarded by the one-shot
    /// latch.
    fn dispatch(&mut self, transport: Transport, firmware: &Path) -> Result<()> {
        if !self.state.try_latch_flash() {
            return Err(FlashError::FlashFailed {
                transport: transport.to_string(),
                reason: "a flash was already dispatched this session".to_string(),
            });
        }

        let device = self
            .state
            .active_device()
            .ok_or(FlashError::DiscoveryEmpty)?
            .clone();
        tracing::debug!(
            identifier = %device.identifier,
            discovered_at = ?device.discovered_at,
            "dispatching flash"
        );

        match transport {
            Transport::Can => {
                let uuid = self
                    .state
                    .resolved_uuid
                    .clone()
                    .unwrap_or(device.identifier);
                flasher::flash_can(self.runner, self.settings, &uuid, firmware)
            }
            Transport::Usb => {
                flasher::flash_usb(self.runner, self.settings, Path::new(&device.identifier), firmware)
            }
            Transport::Dfu => flasher::flash_dfu(self.runner, &device.identifier, firmware),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{CmdOutput, MockCommandRunner};
    use crate::prompt::scripted::{Answer, ScriptedPrompter};
    use serial_test::serial;

    const LSUSB_DFU: &str =
        "Bus 001 Device 004: ID 0483:df11 STMicroelectronics STM Device in DFU Mode\n";

    fn test_settings(temp: &tempfile::TempDir) -> Settings {
        Settings {
            printer_data_dir: temp.path().join("printer_data"),
            klippy_log: temp.path().join("printer_data/logs/klippy.log"),
            serial_by_id_dir: temp.path().join("serial/by-id"),
            settle_secs: 0,
            poll_interval_ms: 1,
            dfu_poll_interval_ms: 1,
            ..Settings::default()
        }
    }

    fn release_tree(temp: &tempfile::TempDir, files: &[&str]) -> PathBuf {
        let root = temp.path().join("release");
        for file in files {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, b"\0fw\0").expect("write");
        }
        root
    }

    /// Runner for a DFU-only cycle: no CAN link, no serial devices, one DFU
    /// device, dfu-util succeeds.
    fn dfu_runner() -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| program == "ip")
            .returning(|_, _, _| Ok(CmdOutput::ok("1: lo: <LOOPBACK>\n")));
        runner
            .expect_run()
            .withf(|program, _, _| program == "lsusb")
            .returning(|_, _, _| Ok(CmdOutput::ok(LSUSB_DFU)));
        runner
            .expect_run()
            .withf(|program, _, _| program == "dfu-util")
            .times(1)
            .returning(|_, _, _| Ok(CmdOutput::ok("Download done.\n")));
        runner
    }

    #[test]
    #[serial]
    fn test_dfu_cycle_flashes_combined_image() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let root = release_tree(
            &temp,
            &[
                "firmware/v2-v3/combined-firmware/combined_probe.bin",
                "firmware/v2-v3/combined-firmware/probe_1m.bin",
            ],
        );
        let runner = dfu_runner();
        let mut prompter = ScriptedPrompter::new([]);
        let opts = RunOptions {
            transport: Some(Transport::Dfu),
            assume_yes: true,
            ..RunOptions::default()
        };

        let mut orch = Orchestrator::new(&runner, &settings, &mut prompter, opts);
        orch.flash_cycle(&root).expect("cycle");

        assert!(orch.state().has_flashed());
        assert_eq!(
            orch.state()
                .selected_artifact
                .as_ref()
                .map(|a| a.file_name.as_str()),
            Some("combined_probe.bin")
        );
    }

    #[test]
    #[serial]
    fn test_second_dispatch_is_latched_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let runner = MockCommandRunner::new();
        let mut prompter = ScriptedPrompter::new([]);
        let mut orch = Orchestrator::new(
            &runner,
            &settings,
            &mut prompter,
            RunOptions::default(),
        );

        assert!(orch.state.try_latch_flash());
        let err = orch
            .dispatch(Transport::Dfu, Path::new("fw.bin"))
            .expect_err("latch must refuse");
        assert!(matches!(err, FlashError::FlashFailed { .. }));
    }

    #[test]
    #[serial]
    fn test_busy_printer_stops_before_any_side_effect() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        // Only the status query is expected; any other command would make
        // the mock panic, proving the gate has no side effects.
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| program == "curl")
            .returning(|_, _, _| {
                Ok(CmdOutput::ok(
                    r#"{"result": {"status": {"print_stats": {"state": "printing"}}}}"#,
                ))
            });
        let mut prompter = ScriptedPrompter::new([]);
        let mut orch = Orchestrator::new(
            &runner,
            &settings,
            &mut prompter,
            RunOptions::default(),
        );

        let err = orch.run().expect_err("gate must refuse");
        assert!(matches!(err, FlashError::PrinterBusy { .. }));
        assert!(!orch.state().precondition_passed);
        assert!(!orch.state().has_flashed());
    }

    #[test]
    #[serial]
    fn test_none_of_these_aborts_without_flashing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let root = release_tree(
            &temp,
            &["firmware/v2-v3/combined-firmware/combined_probe.bin"],
        );
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| program == "ip")
            .returning(|_, _, _| Ok(CmdOutput::ok("1: lo: <LOOPBACK>\n")));
        runner
            .expect_run()
            .withf(|program, _, _| program == "lsusb")
            .returning(|_, _, _| Ok(CmdOutput::ok(LSUSB_DFU)));

        // Selecting the terminal entry (index == candidate count)
        let mut prompter = ScriptedPrompter::new([Answer::Select(Some(1))]);
        let opts = RunOptions {
            transport: Some(Transport::Dfu),
            ..RunOptions::default()
        };
        let mut orch = Orchestrator::new(&runner, &settings, &mut prompter, opts);

        let err = orch.flash_cycle(&root).expect_err("must abort");
        assert!(matches!(err, FlashError::Aborted));
        assert!(!orch.state().has_flashed());
    }

    #[test]
    #[serial]
    fn test_newer_version_needs_acknowledgment_even_with_yes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let runner = MockCommandRunner::new();
        let mut prompter = ScriptedPrompter::new([Answer::Confirm(false), Answer::Confirm(true)]);
        let opts = RunOptions {
            assume_yes: true,
            ..RunOptions::default()
        };
        let mut orch = Orchestrator::new(&runner, &settings, &mut prompter, opts);

        let newer = FirmwareArtifact {
            relative_path: PathBuf::from("v5.1.2/probe_1m.bin"),
            file_name: "probe_1m.bin".to_string(),
            version: Some(Version::new(5, 1, 2)),
        };
        let err = orch.acknowledge_skew(&newer).expect_err("must abort");
        assert!(matches!(err, FlashError::Aborted));
        assert!(!orch.state().skew_acknowledged);

        assert!(orch.acknowledge_skew(&newer).is_ok());
        assert!(orch.state().skew_acknowledged);
    }

    #[test]
    #[serial]
    fn test_reference_version_and_older_skip_the_warning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let runner = MockCommandRunner::new();
        // No scripted answers: any prompt would panic
        let mut prompter = ScriptedPrompter::new([]);
        let mut orch = Orchestrator::new(
            &runner,
            &settings,
            &mut prompter,
            RunOptions::default(),
        );

        for version in [Version::new(5, 0, 0), Version::new(4, 9, 0)] {
            let artifact = FirmwareArtifact {
                relative_path: PathBuf::from(format!("v{version}/probe_1m.bin")),
                file_name: "probe_1m.bin".to_string(),
                version: Some(version),
            };
            assert!(orch.acknowledge_skew(&artifact).is_ok());
        }
        assert!(!orch.state().skew_acknowledged);
    }

    #[test]
    #[serial]
    fn test_empty_discovery_is_recoverable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let root = release_tree(&temp, &[]);
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| program == "ip")
            .returning(|_, _, _| Ok(CmdOutput::ok("1: lo: <LOOPBACK>\n")));
        runner
            .expect_run()
            .withf(|program, _, _| program == "lsusb")
            .returning(|_, _, _| Ok(CmdOutput::ok("Bus 001 Device 001: ID 1d6b:0002 hub\n")));
        let mut prompter = ScriptedPrompter::new([]);
        let mut orch = Orchestrator::new(
            &runner,
            &settings,
            &mut prompter,
            RunOptions::default(),
        );

        let err = orch.flash_cycle(&root).expect_err("nothing to flash");
        assert!(matches!(err, FlashError::DiscoveryEmpty));
        assert!(!err.is_fatal());
    }

    #[test]
    #[serial]
    fn test_unreachable_print_service_proceeds_to_setup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        // Status query fails (service down), so the session continues and
        // reaches the release fetch, which is made to fail in turn.
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, args, _| {
                program == "curl" && args.iter().any(|a| a.contains("print_stats"))
            })
            .times(1)
            .returning(|_, _, _| Ok(CmdOutput::failed("connection refused")));
        runner
            .expect_run()
            .withf(|program, args, _| program == "curl" && args.contains(&"-sSfL".to_string()))
            .times(1)
            .returning(|_, _, _| Ok(CmdOutput::failed("curl: (7) could not connect")));
        let mut prompter = ScriptedPrompter::new([]);
        let mut orch = Orchestrator::new(
            &runner,
            &settings,
            &mut prompter,
            RunOptions::default(),
        );

        let err = orch.run().expect_err("setup fails later");
        assert!(matches!(err, FlashError::SetupFailed { .. }));
        assert!(orch.state().precondition_passed);
    }

    #[test]
    #[serial]
    fn test_explicit_application_device_reboots_into_bootloader() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(&temp);
        let root = release_tree(&temp, &["firmware/v2-v3/survey/v5.0.0/probe_usb.bin"]);

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| program == "ip")
            .returning(|_, _, _| Ok(CmdOutput::ok("1: lo: <LOOPBACK>\n")));
        runner
            .expect_run()
            .withf(|program, _, _| program == "lsusb")
            .returning(|_, _, _| Ok(CmdOutput::ok("Bus 001 Device 001: ID 1d6b:0002 hub\n")));
        // The reboot helper makes the device re-enumerate under its
        // bootloader name.
        let reboot_dir = settings.serial_by_id_dir.clone();
        runner
            .expect_run()
            .withf(|program, args, _| {
                program.ends_with("klippy-env/bin/python")
                    && args.iter().any(|a| a.contains("flash_usb"))
            })
            .times(1)
            .returning(move |_, _, _| {
                std::fs::create_dir_all(&reboot_dir).expect("mkdir");
                std::fs::write(
                    reboot_dir.join("usb-katapult_stm32f042x6_230032000C53-if00"),
                    b"",
                )
                .expect("write");
                Ok(CmdOutput::ok(""))
            });
        runner
            .expect_run()
            .withf(|program, args, _| {
                program == "python3" && args.iter().any(|a| a.contains("flash_can.py"))
            })
            .times(1)
            .returning(|_, _, _| Ok(CmdOutput::ok("Flash Success\n")));

        let mut prompter = ScriptedPrompter::new([]);
        let opts = RunOptions {
            transport: Some(Transport::Usb),
            device: Some("/dev/serial/by-id/usb-Cartographer_614e_2C003B000E50-if00".to_string()),
            assume_yes: true,
            ..RunOptions::default()
        };
        let mut orch = Orchestrator::new(&runner, &settings, &mut prompter, opts);
        orch.flash_cycle(&root).expect("cycle");

        assert!(orch.state().has_flashed());
        let active = orch.state().active_device().expect("active device");
        assert!(active.identifier.contains("katapult"));
    }
}
