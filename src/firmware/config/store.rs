use embedded_storage::{ReadStorage, Storage};
use esp_storage::FlashStorage;

use super::super::types::{WifiCredentials, WIFI_PASSWORD_MAX, WIFI_SSID_MAX};

const STORE_MAGIC: u32 = 0x4C54_534B; // "KSTL"
const STORE_VERSION: u8 = 1;
// magic + version + ssid_len + ssid + password_len + password + checksum
const STORE_RECORD_LEN: usize = 4 + 1 + 1 + WIFI_SSID_MAX + 1 + WIFI_PASSWORD_MAX + 1;

const SSID_LEN_AT: usize = 5;
const SSID_AT: usize = 6;
const PASSWORD_LEN_AT: usize = SSID_AT + WIFI_SSID_MAX;
const PASSWORD_AT: usize = PASSWORD_LEN_AT + 1;

/// Wi-Fi credentials persisted in the last flash sector so they survive
/// reboots and reflashes that leave that sector alone.
pub(crate) struct CredentialStore<'d> {
    flash: FlashStorage<'d>,
    offset: u32,
}

impl<'d> CredentialStore<'d> {
    pub(crate) fn new(flash_peripheral: esp_hal::peripherals::FLASH<'d>) -> Self {
        let flash = FlashStorage::new(flash_peripheral).multicore_auto_park();
        let capacity = flash.capacity() as u32;
        let offset = capacity.saturating_sub(FlashStorage::SECTOR_SIZE);
        Self { flash, offset }
    }

    pub(crate) fn load(&mut self) -> Option<WifiCredentials> {
        let record = self.load_record()?;
        let ssid_len = record[SSID_LEN_AT] as usize;
        let password_len = record[PASSWORD_LEN_AT] as usize;
        if ssid_len == 0 || ssid_len > WIFI_SSID_MAX || password_len > WIFI_PASSWORD_MAX {
            return None;
        }
        WifiCredentials::from_parts(
            &record[SSID_AT..SSID_AT + ssid_len],
            &record[PASSWORD_AT..PASSWORD_AT + password_len],
        )
        .ok()
    }

    pub(crate) fn save(&mut self, credentials: &WifiCredentials) {
        if self.load().as_ref() == Some(credentials) {
            return;
        }
        let mut record = [0xFFu8; STORE_RECORD_LEN];
        record[0..4].copy_from_slice(&STORE_MAGIC.to_le_bytes());
        record[4] = STORE_VERSION;
        record[SSID_LEN_AT] = credentials.ssid_len;
        record[SSID_AT..SSID_AT + WIFI_SSID_MAX].copy_from_slice(&credentials.ssid);
        record[PASSWORD_LEN_AT] = credentials.password_len;
        record[PASSWORD_AT..PASSWORD_AT + WIFI_PASSWORD_MAX]
            .copy_from_slice(&credentials.password);
        record[STORE_RECORD_LEN - 1] = checksum8(&record[..STORE_RECORD_LEN - 1]);
        let _ = self.flash.write(self.offset, &record);
    }

    fn load_record(&mut self) -> Option<[u8; STORE_RECORD_LEN]> {
        let mut record = [0u8; STORE_RECORD_LEN];
        self.flash.read(self.offset, &mut record).ok()?;
        if record.iter().all(|&byte| byte == 0xFF) {
            return None;
        }
        if u32::from_le_bytes([record[0], record[1], record[2], record[3]]) != STORE_MAGIC {
            return None;
        }
        if record[4] != STORE_VERSION {
            return None;
        }
        let expected = checksum8(&record[..STORE_RECORD_LEN - 1]);
        if record[STORE_RECORD_LEN - 1] != expected {
            return None;
        }
        Some(record)
    }
}

fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}
