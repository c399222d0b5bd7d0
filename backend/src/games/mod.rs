pub mod backend_slot_game;
