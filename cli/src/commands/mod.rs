mod equipment;
mod helpers;
mod records;
mod user;
mod workout;

pub(crate) use equipment::{
    cmd_equipment_add, cmd_equipment_attach, cmd_equipment_detach, cmd_equipment_list,
    cmd_equipment_refresh, cmd_equipment_set_active,
};
pub(crate) use helpers::resolve_user;
pub(crate) use records::{cmd_records_rebuild, cmd_records_show};
pub(crate) use user::{cmd_sport_list, cmd_user_add};
pub(crate) use workout::{
    EditWorkoutArgs, MetricArgs, NewWorkoutArgs, cmd_workout_add, cmd_workout_delete,
    cmd_workout_edit, cmd_workout_list, cmd_workout_reprocess,
};
