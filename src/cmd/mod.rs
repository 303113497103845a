//! The AT command catalogue: argument validation, dispatch to
//! `SysConf`/`Nvm`/`Lrw`, and the fixed MAC-status-to-error-code mapping.
//!
//! Commands are routed by a name match in [`Cmd::route`] rather than a
//! pointer table — a `no_std`, no-alloc crate has nowhere natural to stash
//! function pointers with the uniform signature a real jump table would
//! need, and the command set is small enough that a match compiles to
//! something just as flat.

mod identity;
mod keys;
mod radio;
mod session;

use heapless::Vec;

use crate::atci::upload::{UploadOrigin, UploadOutcome};
use crate::atci::{Atci, CmdLink, Dispatcher, Shape, UploadArmer};
use crate::error::AtErr;
use crate::hal::{Clock, MacService, RawStore, Unique};
use crate::lrw::Lrw;
use crate::nvm::Nvm;
use crate::sysconf::SysConf;
use crate::usernvm::UserNvm;

/// Sentinel returned internally by a handler that has armed an upload: the
/// reply is deferred to [`Cmd::on_upload`] and must not be written now. Never
/// observed outside this module.
pub(crate) const DEFERRED: AtErr = AtErr(i32::MIN);

pub(crate) fn pack_upload_origin(port: u8, confirmed: bool) -> UploadOrigin {
    UploadOrigin(port as u16 | ((confirmed as u16) << 8))
}

fn unpack_upload_origin(origin: UploadOrigin) -> (u8, bool) {
    ((origin.0 & 0xff) as u8, origin.0 & 0x100 != 0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetKind {
    Graceful,
    Immediate,
    Halt,
}

/// Volatile command-level state with no direct `SysConf` or `MacMib` home:
/// radio knobs exposed over the air interface (`+DR`, `+RFPOWER`, `+NWK`, `+RFPARAM`,
/// `+DUTYCYCLE`, `+CST`, `+BACKOFF`, `+JOINDC`) plus last-observed traffic
/// stats (`+FRMCNT`, `+RFQ`) fed by `Lrw`'s event translation. Not persisted;
/// a reset returns these to defaults, which matches every one of them being
/// either a test/debug knob or a value the MAC library re-derives on its own
/// after rejoin.
pub struct RadioState {
    pub datarate: u8,
    pub tx_power: i8,
    pub nwk_public: bool,
    pub channels: [u8; 16],
    pub dutycycle: bool,
    pub cst_dbm: i16,
    pub backoff_ms: u32,
    pub joindc_ms: u32,
    pub join_tries: u8,
    pub cert_enabled: bool,
    pub cert_port: u8,
    pub last_uplink_counter: u32,
    pub last_downlink_counter: u32,
    pub last_rssi: i16,
    pub last_snr: i8,
    pub network_time_s: u32,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            datarate: 0,
            tx_power: 14,
            nwk_public: true,
            channels: [0xff; 16],
            dutycycle: true,
            cst_dbm: -80,
            backoff_ms: 0,
            joindc_ms: 0,
            join_tries: 1,
            cert_enabled: false,
            cert_port: 224,
            last_uplink_counter: 0,
            last_downlink_counter: 0,
            last_rssi: 0,
            last_snr: 0,
            network_time_s: 0,
        }
    }
}

pub type CmdResult = Result<Option<Vec<u8, 96>>, AtErr>;

/// The command catalogue. Owns every persisted and volatile piece of state
/// a handler might touch; implements [`Dispatcher`] so `Atci` can drive it
/// without knowing any of this.
pub struct Cmd<M: MacService, R: RawStore, U: Unique> {
    pub sysconf: SysConf,
    pub usernvm: UserNvm,
    pub lrw: Lrw<M>,
    pub nvm: Nvm<R>,
    pub unique: U,
    pub radio: RadioState,
    pub otaa: bool,
    pub schedule_reset: Option<ResetKind>,
}

/// Alias used by the category modules so their signatures read as "a
/// command handler takes a `Ctx`", without every file needing the three
/// generic bounds spelled out at each call site.
pub(crate) type Ctx<M, R, U> = Cmd<M, R, U>;

impl<M: MacService, R: RawStore, U: Unique> Cmd<M, R, U> {
    pub fn new(mut nvm: Nvm<R>, mac: M, unique: U) -> Self {
        let sysconf = SysConf::init(&mut nvm);
        let usernvm = UserNvm::init(&mut nvm);
        let mut lrw = Lrw::new(mac);
        let data = *sysconf.get();
        lrw.set_async_events(data.async_events);
        lrw.set_data_format(data.data_format);
        lrw.set_configured_class(data.device_class.into());
        lrw.set_retries(data.unconfirmed_retx, data.confirmed_retx);
        Self {
            sysconf,
            usernvm,
            lrw,
            nvm,
            unique,
            radio: RadioState::default(),
            otaa: true,
            schedule_reset: None,
        }
    }

    /// Drains anything `Lrw` buffered (host-polling mode), flushes it ahead
    /// of the reply, then writes `+OK`/`+OK=<body>`/`+ERR=<n>` — preserving
    /// "handler output precedes the trailing blank line".
    fn finish(&mut self, link: &mut CmdLink, wake: &crate::wakelock::WakeLockMask, result: CmdResult) {
        self.lrw.drain_pending(link, wake);
        match result {
            Ok(None) => Atci::respond_ok(link, wake),
            Ok(Some(body)) => {
                let mut s: Vec<u8, 128> = Vec::new();
                s.extend_from_slice(b"+OK=").ok();
                s.extend_from_slice(&body).ok();
                s.extend_from_slice(b"\r\n\r\n").ok();
                Atci::write(link, wake, &s);
            }
            Err(e) if e == DEFERRED => {}
            Err(e) => Atci::respond_err(link, wake, e.0),
        }
    }

    fn route(
        &mut self,
        name: &[u8],
        shape: Shape<'_>,
        upload: &mut dyn UploadArmer,
        clock: &dyn Clock,
    ) -> CmdResult {
        use Shape::*;
        let now = clock.now_ms();
        match (name, shape) {
            (b"VER", Read) => identity::ver(self),
            (b"$VER", Read) => identity::dollar_ver(self),
            (b"DEV", Read) => identity::dev(self),
            (b"UART", Read) => identity::uart_read(self),
            (b"UART", Set(a)) => identity::uart_set(self, a),
            (b"REBOOT", Action(a)) => identity::reboot(self, a),
            (b"FACNEW", Action(_)) => identity::facnew(self),
            (b"$HALT", Action(_)) => identity::halt(self),
            (b"TO", Read) => identity::to_read(self),
            (b"TO", Set(a)) => identity::to_set(self, a),
            (b"SLEEP", Read) => identity::sleep_read(self),
            (b"SLEEP", Set(a)) => identity::sleep_set(self, a),
            (b"DFORMAT", Read) => identity::dformat_read(self),
            (b"DFORMAT", Set(a)) => identity::dformat_set(self, a),
            (b"$LOCKKEYS", Action(_)) => identity::lockkeys(self),
            (b"$NVM", Action(Some(a))) => identity::nvm(self, a),

            (b"MODE", Read) => keys::mode_read(self),
            (b"MODE", Set(a)) => keys::mode_set(self, a),
            (b"DEVADDR", Read) => keys::devaddr_read(self),
            (b"DEVADDR", Set(a)) => keys::devaddr_set(self, a),
            (b"DEVEUI", Read) => keys::deveui_read(self),
            (b"DEVEUI", Set(a)) => keys::deveui_set(self, a),
            (b"APPEUI", Read) | (b"$JOINEUI", Read) => keys::joineui_read(self),
            (b"APPEUI", Set(a)) | (b"$JOINEUI", Set(a)) => keys::joineui_set(self, a),
            (b"APPKEY", Set(a)) => keys::appkey_set(self, a, true),
            (b"$APPKEY", Set(a)) => keys::appkey_set(self, a, false),
            (b"NWKSKEY", Set(a)) => keys::nwkskey_set(self, a),
            (b"APPSKEY", Set(a)) => keys::appskey_set(self, a),
            (b"$NWKKEY", Set(a)) => keys::nwkkey_set(self, a),
            (b"$FNWKSINTKEY", Set(a)) => keys::fnwksintkey_set(self, a),
            (b"$SNWKSINTKEY", Set(a)) => keys::snwksintkey_set(self, a),
            (b"$NWKSENCKEY", Set(a)) => keys::nwksenckey_set(self, a),
            (b"NETID", Read) => keys::netid_read(self),
            (b"NETID", Set(a)) => keys::netid_set(self, a),

            (b"BAND", Read) => radio::band_read(self),
            (b"BAND", Set(a)) => radio::band_set(self, a),
            (b"DR", Read) | (b"$DR", Read) => radio::dr_read(self),
            (b"DR", Set(a)) | (b"$DR", Set(a)) => radio::dr_set(self, a),
            (b"RFPOWER", Read) | (b"$RFPOWER", Read) => radio::rfpower_read(self),
            (b"RFPOWER", Set(a)) | (b"$RFPOWER", Set(a)) => radio::rfpower_set(self, a),
            (b"NWK", Read) => radio::nwk_read(self),
            (b"NWK", Set(a)) => radio::nwk_set(self, a),
            (b"CHMASK", Read) | (b"$CHMASK", Read) => radio::chmask_read(self),
            (b"CHMASK", Set(a)) | (b"$CHMASK", Set(a)) => radio::chmask_set(self, a),
            (b"RFPARAM", Set(a)) => radio::rfparam_set(self, a),
            (b"DUTYCYCLE", Read) => radio::dutycycle_read(self),
            (b"DUTYCYCLE", Set(a)) => radio::dutycycle_set(self, a),
            (b"DWELL", Read) => radio::dwell_read(self),
            (b"DWELL", Set(a)) => radio::dwell_set(self, a),
            (b"MAXEIRP", Read) => radio::maxeirp_read(self),
            (b"MAXEIRP", Set(a)) => radio::maxeirp_set(self, a),
            (b"ADR", Read) => radio::adr_read(self),
            (b"ADR", Set(a)) => radio::adr_set(self, a),
            (b"ADRACK", Read) => radio::adrack_read(self),
            (b"ADRACK", Set(a)) => radio::adrack_set(self, a),
            (b"DELAY", Read) => radio::delay_read(self),
            (b"DELAY", Set(a)) => radio::delay_set(self, a),
            (b"RX2", Read) | (b"$RX2", Read) => radio::rx2_read(self),
            (b"RX2", Set(a)) | (b"$RX2", Set(a)) => radio::rx2_set(self, a),
            (b"REP", Read) => radio::rep_read(self),
            (b"REP", Set(a)) => radio::rep_set(self, a),
            (b"RTYNUM", Read) => radio::rtynum_read(self),
            (b"RTYNUM", Set(a)) => radio::rtynum_set(self, a),
            (b"RSSITH", Read) => radio::rssith_read(self),
            (b"RSSITH", Set(a)) => radio::rssith_set(self, a),
            (b"CST", Read) => radio::cst_read(self),
            (b"CST", Set(a)) => radio::cst_set(self, a),

            (b"JOIN", Action(a)) => session::join(self, a),
            (b"JOINDC", Read) => session::joindc_read(self),
            (b"JOINDC", Set(a)) => session::joindc_set(self, a),
            (b"LNCHECK", Action(_)) => session::lncheck(self),
            (b"$DEVTIME", Action(_)) => session::devtime(self),
            (b"PORT", Read) => session::port_read(self),
            (b"PORT", Set(a)) => session::port_set(self, a),
            (b"UTX", Action(Some(a))) => session::arm_tx(self, a, false, false, upload, now),
            (b"CTX", Action(Some(a))) => session::arm_tx(self, a, false, true, upload, now),
            (b"PUTX", Action(Some(a))) => session::arm_tx(self, a, true, false, upload, now),
            (b"PCTX", Action(Some(a))) => session::arm_tx(self, a, true, true, upload, now),
            (b"MCAST", Set(a)) => session::mcast(self, a),
            (b"FRMCNT", Read) => session::frmcnt_read(self),
            (b"MSIZE", Read) => session::msize(self),
            (b"RFQ", Read) => session::rfq(self),
            (b"BACKOFF", Read) => session::backoff_read(self),
            (b"BACKOFF", Set(a)) => session::backoff_set(self, a),
            (b"$SESSION", Read) => session::session(self),
            (b"$ACTIVATED", Read) => session::activated(self),
            (b"$PING", Action(_)) => session::ping(self),
            (b"$CERT", Read) => session::cert_read(self),
            (b"$CERT", Set(a)) => session::cert_set(self, a),
            (b"$CW", Set(a)) => session::cw(self, a),
            (b"$CM", Set(a)) => session::cm(self, a),
            (b"$TIME", Read) => session::time(self),

            (b"CLAC", Action(_)) => self.clac(),
            (b"HELP", Action(_)) => self.help(),

            _ => Err(AtErr::UNKNOWN_COMMAND),
        }
    }

    fn clac(&self) -> CmdResult {
        let mut v: Vec<u8, 96> = Vec::new();
        for (i, name) in COMMAND_NAMES.iter().enumerate() {
            if i > 0 {
                v.push(b',').ok();
            }
            v.extend_from_slice(b"AT").ok();
            v.extend_from_slice(name).ok();
        }
        Ok(Some(v))
    }

    fn help(&self) -> CmdResult {
        // A full hint string per command would overflow a 96-byte reply
        // body; `CLAC` already lists every name, so `HELP` just points there
        // (see DESIGN.md).
        let mut v: Vec<u8, 96> = Vec::new();
        v.extend_from_slice(b"see AT+CLAC for the command list").ok();
        Ok(Some(v))
    }
}

const COMMAND_NAMES: &[&[u8]] = &[
    b"+VER", b"$VER", b"+DEV", b"+UART", b"+REBOOT", b"+FACNEW", b"$HALT", b"+TO", b"+SLEEP", b"+DFORMAT",
    b"$LOCKKEYS", b"$NVM", b"+MODE", b"+DEVADDR", b"+DEVEUI", b"+APPEUI", b"$JOINEUI", b"+APPKEY", b"$APPKEY",
    b"+NWKSKEY", b"+APPSKEY", b"$NWKKEY", b"$FNWKSINTKEY", b"$SNWKSINTKEY", b"$NWKSENCKEY", b"+NETID", b"+BAND",
    b"+DR", b"$DR", b"+RFPOWER", b"$RFPOWER", b"+NWK", b"+CHMASK", b"$CHMASK", b"+RFPARAM", b"+DUTYCYCLE",
    b"+DWELL", b"+MAXEIRP", b"+ADR", b"+ADRACK", b"+DELAY", b"+RX2", b"$RX2", b"+REP", b"+RTYNUM", b"+RSSITH",
    b"+CST", b"+JOIN", b"+JOINDC", b"+LNCHECK", b"$DEVTIME", b"+PORT", b"+UTX", b"+CTX", b"+PUTX", b"+PCTX",
    b"+MCAST", b"+FRMCNT", b"+MSIZE", b"+RFQ", b"+BACKOFF", b"$SESSION", b"$ACTIVATED", b"$PING", b"$CERT",
    b"$CW", b"$CM", b"$TIME", b"+CLAC", b"+HELP",
];

/// Called once an armed upload's payload is fully assembled: unpacks the
/// origin tag and submits it as an uplink.
fn deliver_upload<M: MacService, R: RawStore, U: Unique>(ctx: &mut Cmd<M, R, U>, outcome: UploadOutcome) -> CmdResult {
    match outcome {
        UploadOutcome::Ok(origin, payload) => {
            let (port, confirmed) = unpack_upload_origin(origin);
            ctx.lrw.send(port, &payload, confirmed)?;
            Ok(None)
        }
        // Neither case has a dedicated error code; `-3` (invalid parameter
        // value) is the closest fit for a malformed or abandoned payload.
        UploadOutcome::Aborted(_, _) => Err(AtErr::INVALID_VALUE),
        UploadOutcome::EncodingError(_) => Err(AtErr::INVALID_VALUE),
    }
}

impl<M: MacService, R: RawStore, U: Unique> Dispatcher for Cmd<M, R, U> {
    fn dispatch(
        &mut self,
        name: &[u8],
        shape: Shape<'_>,
        link: &mut CmdLink,
        wake: &crate::wakelock::WakeLockMask,
        clock: &dyn Clock,
        upload: &mut dyn UploadArmer,
    ) {
        let result = self.route(name, shape, upload, clock);
        self.finish(link, wake, result);
    }

    fn on_upload(
        &mut self,
        outcome: UploadOutcome,
        link: &mut CmdLink,
        wake: &crate::wakelock::WakeLockMask,
        _clock: &dyn Clock,
    ) {
        let result = deliver_upload(self, outcome);
        self.finish(link, wake, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atci::upload::ArmError;
    use crate::hal::fake::{FakeClock, FakeMac};
    use crate::hal::MacStatus;
    use crate::nvm::test_support::MemStore;

    struct FakeUnique;
    impl Unique for FakeUnique {
        fn id(&self) -> [u8; 8] {
            [1, 2, 3, 4, 5, 6, 7, 8]
        }
    }

    struct NullUpload;
    impl UploadArmer for NullUpload {
        fn arm_upload(
            &mut self,
            _origin: UploadOrigin,
            _length: usize,
            _encoding: Encoding,
            _timeout_ms: u32,
            _now_ms: u32,
        ) -> Result<Option<UploadOutcome>, ArmError> {
            Ok(Some(UploadOutcome::Ok(UploadOrigin(0), heapless::Vec::new())))
        }
    }

    use crate::atci::upload::Encoding;

    fn fresh_cmd() -> Cmd<FakeMac, MemStore, FakeUnique> {
        let nvm = Nvm::format(MemStore::new(8192)).unwrap();
        Cmd::new(nvm, FakeMac::default(), FakeUnique)
    }

    #[test]
    fn unknown_command_yields_negative_one() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        let result = cmd.route(b"BOGUS", Shape::Action(None), &mut upload, &clock);
        assert_eq!(result, Err(AtErr::UNKNOWN_COMMAND));
    }

    #[test]
    fn ver_read_reports_firmware_version() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        let result = cmd.route(b"VER", Shape::Read, &mut upload, &clock).unwrap();
        assert_eq!(result.unwrap(), b"1.0.0".as_slice());
    }

    #[test]
    fn uart_set_rejects_invalid_baud() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        let result = cmd.route(b"UART", Shape::Set(b"1234"), &mut upload, &clock);
        assert_eq!(result, Err(AtErr::INVALID_VALUE));
    }

    #[test]
    fn deveui_round_trips_through_set_and_read() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        cmd.route(b"DEVEUI", Shape::Set(b"0102030405060708"), &mut upload, &clock).unwrap();
        let out = cmd.route(b"DEVEUI", Shape::Read, &mut upload, &clock).unwrap().unwrap();
        assert_eq!(&out[..], b"0102030405060708");
    }

    #[test]
    fn deveui_read_denied_once_keys_locked() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        cmd.route(b"$LOCKKEYS", Shape::Action(None), &mut upload, &clock).unwrap();
        let result = cmd.route(b"DEVEUI", Shape::Read, &mut upload, &clock);
        assert_eq!(result, Err(AtErr::KEY_ACCESS_DENIED));
    }

    #[test]
    fn join_otaa_failure_maps_mac_status() {
        let mut cmd = fresh_cmd();
        cmd.lrw.mac_mut().next_join_status = MacStatus::NoFreeChannel;
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        let result = cmd.route(b"JOIN", Shape::Action(None), &mut upload, &clock);
        assert_eq!(result, Err(AtErr::NO_FREE_CHANNEL));
    }

    #[test]
    fn send_before_join_reports_not_joined() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        let result = cmd.route(b"UTX", Shape::Action(Some(b"0")), &mut upload, &clock);
        // length 0 fires immediately and is delivered straight to `Lrw::send`.
        assert_eq!(result, Err(AtErr::NOT_JOINED));
    }

    #[test]
    fn facnew_schedules_graceful_reset() {
        let mut cmd = fresh_cmd();
        let clock = FakeClock::new();
        let mut upload = NullUpload;
        cmd.route(b"FACNEW", Shape::Action(None), &mut upload, &clock).unwrap();
        assert_eq!(cmd.schedule_reset, Some(ResetKind::Graceful));
    }

    #[test]
    fn clac_lists_every_command_name() {
        let cmd = fresh_cmd();
        let out = cmd.clac().unwrap().unwrap();
        assert!(out.windows(6).any(|w| w == b"AT+VER"));
        assert!(out.windows(6).any(|w| w == b"AT+JOIN"[..6].as_ref() || w == b"AT+JOI"));
    }
}
