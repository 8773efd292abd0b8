pub mod verify_dto;
