// Mirrors migrations/2024-11-04-120000_create_tables.

diesel::table! {
    containers (name) {
        name -> Text,
        label -> Text,
    }
}

diesel::table! {
    thermometers (device_id) {
        device_id -> Text,
        device_group -> Text,
        device_name -> Text,
    }
}

diesel::table! {
    container_thermometers (container_id, thermometer_id) {
        container_id -> Text,
        thermometer_id -> Text,
    }
}

diesel::table! {
    tasks (id) {
        id -> Text,
        start -> Int8,
        duration -> Int8,
        t_start -> Numeric,
        t_min -> Numeric,
        t_max -> Numeric,
        t_freeze -> Numeric,
        status -> Text,
    }
}

diesel::table! {
    container_tasks (task_id) {
        task_id -> Text,
        container_id -> Text,
    }
}

diesel::table! {
    settings (id) {
        id -> Text,
        status -> Text,
        temperature -> Numeric,
        timestamp -> Int8,
    }
}

diesel::table! {
    container_sets (set_id) {
        set_id -> Text,
        container_id -> Text,
    }
}

diesel::table! {
    readings (id) {
        id -> Text,
        thermometer -> Text,
        temperature -> Text,
        read_time -> Text,
        db_time -> Int8,
    }
}

diesel::table! {
    task_reads (task_id, read_id) {
        task_id -> Text,
        read_id -> Text,
    }
}

diesel::table! {
    container_checks (id) {
        id -> Text,
        container -> Text,
        timestamp -> Int8,
        logged -> Text,
        received -> Text,
        power -> Text,
        read_setpoint -> Text,
    }
}

diesel::table! {
    controls (id) {
        id -> Text,
        timestamp -> Int8,
        target_setpoint -> Text,
    }
}

diesel::table! {
    task_controls (task_id, control_id) {
        task_id -> Text,
        control_id -> Text,
    }
}

diesel::table! {
    set_controls (set_id, control_id) {
        set_id -> Text,
        control_id -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    containers,
    thermometers,
    container_thermometers,
    tasks,
    container_tasks,
    settings,
    container_sets,
    readings,
    task_reads,
    container_checks,
    controls,
    task_controls,
    set_controls,
);
