diesel::table! {
    kiosks (id) {
        id -> Integer,
        mac_address -> Text,
        serial_number -> Text,
        name -> Text,
        ip_address -> Nullable<Text>,
        ftp_username -> Text,
        ftp_password -> Text,
        status -> Text,             // online | offline
        last_connection -> Nullable<Timestamp>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    settings (key) {
        key -> Text,
        value -> Text,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(kiosks, settings, users);
