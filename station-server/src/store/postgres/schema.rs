// Mirrors migrations/2024-01-01-000000_create_reservations.

diesel::table! {
    users (id) {
        id -> Int8,
        email -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        password_hash -> Text,
        is_staff -> Bool,
    }
}

diesel::table! {
    crews (id) {
        id -> Int8,
        first_name -> Varchar,
        last_name -> Varchar,
        position -> Varchar,
    }
}

diesel::table! {
    train_types (id) {
        id -> Int8,
        name -> Varchar,
    }
}

diesel::table! {
    trains (id) {
        id -> Int8,
        name -> Varchar,
        cargo_num -> Int4,
        places_in_cargo -> Int4,
        train_type_id -> Int8,
    }
}

diesel::table! {
    stations (id) {
        id -> Int8,
        name -> Varchar,
        latitude -> Float8,
        longitude -> Float8,
    }
}

diesel::table! {
    routes (id) {
        id -> Int8,
        source_id -> Int8,
        destination_id -> Int8,
        distance -> Int4,
    }
}

diesel::table! {
    trips (id) {
        id -> Int8,
        route_id -> Int8,
        train_id -> Int8,
        departure_time -> Timestamptz,
        arrival_time -> Timestamptz,
    }
}

diesel::table! {
    trip_crews (trip_id, crew_id) {
        trip_id -> Int8,
        crew_id -> Int8,
    }
}

diesel::table! {
    orders (id) {
        id -> Int8,
        user_id -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Int8,
        order_id -> Int8,
        trip_id -> Int8,
        cargo -> Int4,
        seat -> Int4,
    }
}

diesel::joinable!(trains -> train_types (train_type_id));
diesel::joinable!(trips -> routes (route_id));
diesel::joinable!(trips -> trains (train_id));
diesel::joinable!(trip_crews -> trips (trip_id));
diesel::joinable!(trip_crews -> crews (crew_id));
diesel::joinable!(orders -> users (user_id));
diesel::joinable!(tickets -> orders (order_id));
diesel::joinable!(tickets -> trips (trip_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    crews,
    train_types,
    trains,
    stations,
    routes,
    trips,
    trip_crews,
    orders,
    tickets,
);
