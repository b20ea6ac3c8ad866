use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub fn get_schedule(&self, owner: ScheduleOwner) -> Option<WeeklySchedule> {
        self.store.get_schedule(&owner)
    }

    /// Store the first schedule for `owner`. The owner must exist and must
    /// not have a schedule yet.
    pub async fn create_schedule(
        &self,
        owner: ScheduleOwner,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        validate_schedule(&schedule)?;
        if self.ports.resources.get(owner).await.is_none() {
            return Err(EngineError::NotFound(owner.id()));
        }

        let _gate = self.write_gate().await;
        let _serial = self.schedule_writes.lock().await;
        if self.store.contains_schedule(&owner) {
            return Err(EngineError::AlreadyExists(owner.id()));
        }
        self.persist_schedule(&Event::ScheduleSaved { owner, schedule }).await?;
        info!("schedule created for {owner}");
        Ok(())
    }

    /// Swap the stored schedule for `schedule` as a whole. Day plans missing
    /// from `schedule` are gone afterwards.
    pub async fn replace_schedule(
        &self,
        owner: ScheduleOwner,
        schedule: WeeklySchedule,
    ) -> Result<(), EngineError> {
        validate_schedule(&schedule)?;

        let _gate = self.write_gate().await;
        let _serial = self.schedule_writes.lock().await;
        if !self.store.contains_schedule(&owner) {
            return Err(EngineError::NotFound(owner.id()));
        }
        self.persist_schedule(&Event::ScheduleSaved { owner, schedule }).await?;
        info!("schedule replaced for {owner}");
        Ok(())
    }

    /// Deleting a schedule that does not exist succeeds and logs nothing.
    pub async fn delete_schedule(&self, owner: ScheduleOwner) -> Result<(), EngineError> {
        let _gate = self.write_gate().await;
        let _serial = self.schedule_writes.lock().await;
        if !self.store.contains_schedule(&owner) {
            return Ok(());
        }
        self.persist_schedule(&Event::ScheduleDeleted { owner }).await?;
        info!("schedule deleted for {owner}");
        Ok(())
    }
}

pub(crate) fn validate_schedule(schedule: &WeeklySchedule) -> Result<(), EngineError> {
    if schedule.days.len() > MAX_DAY_PLANS {
        return Err(EngineError::Validation(format!(
            "a week has at most {MAX_DAY_PLANS} day plans"
        )));
    }
    let mut seen = [false; 7];
    for plan in &schedule.days {
        let day = plan.day_of_week as usize;
        if day >= seen.len() {
            return Err(EngineError::Validation(format!(
                "day of week must be 0..=6, got {day}"
            )));
        }
        if std::mem::replace(&mut seen[day], true) {
            return Err(EngineError::Validation(format!("day {day} appears twice")));
        }
        if plan.blocks.len() > MAX_BLOCKS_PER_DAY {
            return Err(EngineError::Validation(format!(
                "day {day} has more than {MAX_BLOCKS_PER_DAY} time blocks"
            )));
        }
        if plan.breaks.len() > MAX_BREAKS_PER_DAY {
            return Err(EngineError::Validation(format!(
                "day {day} has more than {MAX_BREAKS_PER_DAY} breaks"
            )));
        }
        if let Some(bad) = plan.blocks.iter().chain(&plan.breaks).find(|r| !r.is_valid()) {
            return Err(EngineError::Validation(format!(
                "day {day}: {} must be after {}",
                bad.end, bad.start
            )));
        }
    }
    Ok(())
}
