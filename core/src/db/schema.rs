// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

table! {
    bridge (bridge_id) {
        bridge_id -> Text,
        #[sql_name = "type"]
        type_ -> Text,
        provider_id -> Text,
        home_network_id -> Text,
        home_address -> Text,
        foreign_network_id -> Text,
        foreign_address -> Text,
        current_home_block_number -> BigInt,
        current_foreign_block_number -> BigInt,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

table! {
    bridge_link (bridge_link_id) {
        bridge_link_id -> Text,
        native_token_id -> Text,
        bridged_token_id -> Text,
        bridge_id -> Text,
        transaction_hash -> Text,
        created_at -> Text,
    }
}

table! {
    image (image_hash) {
        image_hash -> Text,
        content -> Nullable<Binary>,
        uri -> Text,
        ext -> Text,
        mode -> Text,
        created_at -> Text,
    }
}

table! {
    link (uri) {
        uri -> Text,
        image_hash -> Text,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

table! {
    list (list_id) {
        list_id -> Text,
        provider_id -> Text,
        network_id -> Nullable<Text>,
        key -> Text,
        name -> Text,
        description -> Text,
        major -> Integer,
        minor -> Integer,
        patch -> Integer,
        image_hash -> Nullable<Text>,
        default_list -> Bool,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

table! {
    list_order (list_order_id) {
        list_order_id -> Text,
        provider_id -> Text,
        key -> Text,
        #[sql_name = "type"]
        type_ -> Text,
        name -> Text,
        description -> Text,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

table! {
    list_order_item (list_order_item_id) {
        list_order_item_id -> Text,
        list_order_id -> Text,
        provider_id -> Text,
        list_key -> Text,
        ranking -> Integer,
    }
}

table! {
    list_token (list_token_id) {
        list_token_id -> Text,
        token_id -> Text,
        list_id -> Text,
        image_hash -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

table! {
    network (network_id) {
        network_id -> Text,
        #[sql_name = "type"]
        type_ -> Text,
        chain_id -> Text,
        image_hash -> Nullable<Text>,
        created_at -> Text,
    }
}

table! {
    provider (provider_id) {
        provider_id -> Text,
        key -> Text,
        name -> Text,
        description -> Text,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

table! {
    token (network_id, provided_id) {
        token_id -> Text,
        network_id -> Text,
        provided_id -> Text,
        name -> Text,
        symbol -> Text,
        decimals -> Integer,
        #[sql_name = "type"]
        type_ -> Text,
        created_at -> Text,
    }
}

joinable!(bridge -> provider (provider_id));
joinable!(bridge_link -> bridge (bridge_id));
joinable!(link -> image (image_hash));
joinable!(list -> provider (provider_id));
joinable!(list_order -> provider (provider_id));
joinable!(list_order_item -> list_order (list_order_id));
joinable!(list_token -> list (list_id));
joinable!(token -> network (network_id));

allow_tables_to_appear_in_same_query!(
    bridge,
    bridge_link,
    image,
    link,
    list,
    list_order,
    list_order_item,
    list_token,
    network,
    provider,
    token,
);
