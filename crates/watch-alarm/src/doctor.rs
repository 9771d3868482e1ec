use anyhow::Result;
use std::path::Path;

use crate::AlarmConfig;

pub fn check_cooldown(cfg: &AlarmConfig) -> Result<()> {
    let cd = cfg.cooldown()?;
    anyhow::ensure!(cd.as_secs() <= 600, "alarm.cooldown_s above 10 minutes; alerts would be missed");
    Ok(())
}

pub fn check_sound(cfg: &AlarmConfig) -> Result<()> {
    let p = Path::new(&cfg.sound_path);
    anyhow::ensure!(p.is_file(), "alarm.sound_path missing: {}", cfg.sound_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_range() {
        check_cooldown(&AlarmConfig::default()).unwrap();
        let long = AlarmConfig { cooldown_s: 3600.0, ..Default::default() };
        assert!(check_cooldown(&long).is_err());
    }

    #[test]
    fn sound_presence() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let cfg = AlarmConfig { sound_path: f.path().to_str().unwrap().into(), ..Default::default() };
        check_sound(&cfg).unwrap();
        let missing = AlarmConfig { sound_path: "/nonexistent/alarm.wav".into(), ..Default::default() };
        assert!(check_sound(&missing).is_err());
    }
}
