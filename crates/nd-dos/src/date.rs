//! FAT timestamp packing.
//!
//! The packed layout, MSB first:
//! `year - 1980 (7b) | month (4b) | day (5b) | hour (5b) | minute (6b) | second / 2 (5b)`

/// Packed FAT date word.
///
/// month in range 1..=12, day in range 1..=31
pub fn fat_date(year: u32, month: u32, day: u32) -> u16 {
    ((year.saturating_sub(1980) as u16) << 9) | ((month as u16) << 5) | day as u16
}

/// Packed FAT time word. DOS stores seconds divided by two.
pub fn fat_time(hour: u32, minute: u32, second: u32) -> u16 {
    ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2)
}

/// Combined 32-bit timestamp with the date in the high word.
pub fn fat_date_time(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> u32 {
    ((fat_date(year, month, day) as u32) << 16) | fat_time(hour, minute, second) as u32
}

/// Split a packed timestamp back into (year, month, day, hour, minute, second).
pub fn fat_fields(v: u32) -> (u32, u32, u32, u32, u32, u32) {
    let date = v >> 16;
    let time = v & 0xffff;
    (
        1980 + (date >> 9),
        (date >> 5) & 0xf,
        date & 0x1f,
        time >> 11,
        (time >> 5) & 0x3f,
        (time & 0x1f) * 2,
    )
}

/// Convert a unix timestamp into the packed FAT format using local time.
pub fn unix2fat(t: i64) -> u32 {
    let t = t as libc::time_t;
    let mut tm: libc::tm = unsafe { core::mem::zeroed() };
    unsafe { libc::localtime_r(&t, &mut tm) };
    fat_date_time(
        // FAT starts at 1980
        (tm.tm_year + 1900).max(1980) as u32,
        tm.tm_mon as u32 + 1,
        tm.tm_mday as u32,
        tm.tm_hour as u32,
        tm.tm_min as u32,
        // a leap second does not fit the 5-bit field
        (tm.tm_sec as u32).min(59),
    )
}

/// Seconds since the unix epoch.
pub fn unix_now() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}
