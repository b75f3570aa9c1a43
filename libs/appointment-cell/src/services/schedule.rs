// libs/appointment-cell/src/services/schedule.rs
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_utils::time_window::{parse_date, week_start};
use shared_utils::{ClinicCalendar, YearMonth};

use crate::models::{
    AppointmentError, PublishScheduleRequest, PublishedDay, PublishedSession, ScheduleSlot, Session, WeekCell,
    WeekRow, WeekView,
};
use crate::state::AppointmentState;
use crate::store::{AppointmentFilter, ClinicStore};

/// Staff-facing schedule publication (one doctor, one month at a time) and the
/// clinic-wide week grid built from it.
pub struct ScheduleService {
    store: Arc<dyn ClinicStore>,
    calendar: ClinicCalendar,
    morning_time: NaiveTime,
    afternoon_time: NaiveTime,
    default_capacity: u32,
}

impl ScheduleService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            calendar: state.calendar,
            morning_time: state.morning_time,
            afternoon_time: state.afternoon_time,
            default_capacity: state.config.default_slot_capacity,
        }
    }

    fn session_time(&self, session: Session) -> NaiveTime {
        match session {
            Session::Morning => self.morning_time,
            Session::Afternoon => self.afternoon_time,
        }
    }

    fn parse_month(month: &str) -> Result<YearMonth, AppointmentError> {
        month
            .parse::<YearMonth>()
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))
    }

    /// Replaces the doctor's slots for the month with the requested sessions.
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, month = %request.month))]
    pub async fn publish_month(&self, request: PublishScheduleRequest) -> Result<Vec<ScheduleSlot>, AppointmentError> {
        let month = Self::parse_month(&request.month)?;

        let mut seen: HashSet<(NaiveDate, Session)> = HashSet::new();
        let mut slots = Vec::new();

        for day in &request.days {
            let date = parse_date(&day.date).map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
            if !month.contains(date) {
                return Err(AppointmentError::ValidationError(format!(
                    "date {} is outside {}",
                    date, month
                )));
            }

            if day.sessions.is_empty() {
                return Err(AppointmentError::ValidationError(format!(
                    "date {} has no sessions",
                    date
                )));
            }

            let capacity = day.capacity.unwrap_or(self.default_capacity);
            if capacity < 1 {
                return Err(AppointmentError::ValidationError(format!(
                    "capacity for {} must be at least 1",
                    date
                )));
            }

            for raw in &day.sessions {
                let session: Session = raw.parse()?;
                if !seen.insert((date, session)) {
                    return Err(AppointmentError::ValidationError(format!(
                        "duplicate {:?} session on {}",
                        session, date
                    )));
                }

                slots.push(ScheduleSlot {
                    id: Uuid::new_v4(),
                    doctor_id: request.doctor_id,
                    department_id: request.department_id,
                    slot_date: date,
                    slot_time: self.session_time(session),
                    capacity,
                });
            }
        }

        slots.sort_by_key(|s| (s.slot_date, s.slot_time));
        let stored = self.store.replace_month(request.doctor_id, month, slots).await?;

        info!("Published {} slots for doctor {} in {}", stored.len(), request.doctor_id, month);
        Ok(stored)
    }

    /// Published slots for the month, grouped by date.
    pub async fn published_month(&self, doctor_id: Uuid, month: &str) -> Result<Vec<PublishedDay>, AppointmentError> {
        let month = Self::parse_month(month)?;
        let slots = self.store.slots_for_month(doctor_id, month).await?;

        let mut by_date: BTreeMap<NaiveDate, Vec<PublishedSession>> = BTreeMap::new();
        for slot in slots {
            by_date.entry(slot.slot_date).or_default().push(PublishedSession {
                session: Session::for_time(slot.slot_time),
                time: slot.slot_time,
                capacity: slot.capacity,
            });
        }

        Ok(by_date
            .into_iter()
            .map(|(date, mut sessions)| {
                sessions.sort_by_key(|s| s.time);
                PublishedDay { date, sessions }
            })
            .collect())
    }

    /// Months with at least one published slot, ascending.
    pub async fn published_months(&self) -> Result<Vec<YearMonth>, AppointmentError> {
        let months: BTreeSet<YearMonth> = self
            .store
            .published_dates()
            .await?
            .into_iter()
            .map(YearMonth::of)
            .collect();
        Ok(months.into_iter().collect())
    }

    /// Sunday starts of the weeks in which the month has published slots.
    pub async fn weeks_in_month(&self, month: &str) -> Result<Vec<NaiveDate>, AppointmentError> {
        let month = Self::parse_month(month)?;
        let slots = self.store.slots_between(month.first_day(), month.last_day()).await?;

        let weeks: BTreeSet<NaiveDate> = slots.iter().map(|s| week_start(s.slot_date)).collect();
        Ok(weeks.into_iter().collect())
    }

    /// Every published slot of the Sunday-to-Saturday week containing `week`,
    /// one row per (time of day, department) with each doctor's current load.
    #[instrument(skip(self))]
    pub async fn week_view(&self, week: &str) -> Result<WeekView, AppointmentError> {
        let date = parse_date(week).map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        let first = week_start(date);
        let dates: Vec<NaiveDate> = (0..7).map(|offset| first + Duration::days(offset)).collect();
        let last = first + Duration::days(6);

        let slots = self.store.slots_between(first, last).await?;
        let load = self.load_between(first, last).await?;

        let mut names: HashMap<Uuid, Option<String>> = HashMap::new();
        let mut rows: BTreeMap<(NaiveTime, Option<Uuid>), Vec<Vec<WeekCell>>> = BTreeMap::new();

        for slot in slots {
            if !names.contains_key(&slot.doctor_id) {
                let name = self.store.doctor(slot.doctor_id).await?.map(|d| d.name);
                if name.is_none() {
                    warn!("Doctor {} has slots but is missing from the directory", slot.doctor_id);
                }
                names.insert(slot.doctor_id, name);
            }

            let instant = self.calendar.to_instant(slot.slot_date, slot.slot_time);
            let count = load.get(&(slot.doctor_id, instant)).copied().unwrap_or(0);
            let day = (slot.slot_date - first).num_days() as usize;

            let days = rows
                .entry((slot.slot_time, slot.department_id))
                .or_insert_with(|| vec![Vec::new(); 7]);
            if let Some(cells) = days.get_mut(day) {
                cells.push(WeekCell {
                    doctor_id: slot.doctor_id,
                    doctor_name: names.get(&slot.doctor_id).cloned().flatten(),
                    count,
                    capacity: slot.capacity,
                    full: count >= slot.capacity,
                });
            }
        }

        debug!("Week of {} has {} rows", first, rows.len());
        Ok(WeekView {
            week_start: first,
            dates,
            rows: rows
                .into_iter()
                .map(|((time, department_id), days)| WeekRow {
                    time,
                    session: Session::for_time(time),
                    department_id,
                    days,
                })
                .collect(),
        })
    }

    async fn load_between(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<HashMap<(Uuid, DateTime<Utc>), u32>, AppointmentError> {
        let filter = AppointmentFilter {
            start: Some(self.calendar.day_bounds(first).0),
            end: Some(self.calendar.day_bounds(last).1),
            ..AppointmentFilter::default()
        };

        let mut load = HashMap::new();
        for appointment in self.store.list_matching(&filter).await? {
            if appointment.occupies_slot() {
                *load.entry((appointment.doctor_id, appointment.appointment_time)).or_insert(0) += 1;
            }
        }
        Ok(load)
    }
}
